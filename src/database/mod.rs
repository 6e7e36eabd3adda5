use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use std::error::Error;

use crate::models::{REFERRALS_COLLECTION, USERS_COLLECTION};

const DEFAULT_DB_NAME: &str = "referral_service";

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

/// Database name from the URI path, e.g. `mongodb://host:27017/referrals?replicaSet=rs0`.
fn database_name(uri: &str) -> &str {
    let without_scheme = uri.split_once("://").map(|(_, rest)| rest).unwrap_or(uri);
    without_scheme
        .split_once('/')
        .map(|(_, path)| path.split('?').next().unwrap_or_default())
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DB_NAME)
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, Box<dyn Error>> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(5);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));

        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;
        let db = client.database(database_name(uri));

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { client, db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    async fn create_index(
        &self,
        collection: &str,
        keys: Document,
        options: Option<IndexOptions>,
    ) -> mongodb::error::Result<()> {
        let label = format!("{}({})", collection, keys.keys().cloned().collect::<Vec<_>>().join(", "));
        let index = IndexModel::builder().keys(keys).options(options).build();

        self.collection::<Document>(collection).create_index(index).await?;
        log::info!("   ✅ Index created: {}", label);
        Ok(())
    }

    /// Sort indexes only speed up listings; a failure is logged and startup goes on.
    async fn create_sort_index(&self, collection: &str, keys: Document) {
        if let Err(e) = self.create_index(collection, keys, None).await {
            log::warn!("   ⚠️  Sort index on {} not created: {}", collection, e);
        }
    }

    /// Unique indexes back the sign-up and case-number uniqueness checks,
    /// so failing to create one stops startup.
    async fn ensure_indexes(&self) -> Result<(), Box<dyn Error>> {
        log::info!("🔧 Creating database indexes...");

        let unique_sparse = || Some(IndexOptions::builder().unique(true).sparse(true).build());

        for field in ["email.address", "googleId", "phoneNumber"] {
            let mut keys = Document::new();
            keys.insert(field, 1);
            self.create_index(USERS_COLLECTION, keys, unique_sparse())
                .await
                .map_err(|e| format!("unique index on users.{} failed: {}", field, e))?;
        }
        self.create_index(
            REFERRALS_COLLECTION,
            doc! { "referralCaseNumber": 1 },
            Some(IndexOptions::builder().unique(true).build()),
        )
        .await
        .map_err(|e| format!("unique index on referrals.referralCaseNumber failed: {}", e))?;

        if let Err(e) = self
            .create_index(
                USERS_COLLECTION,
                doc! { "verificationToken": 1 },
                Some(IndexOptions::builder().sparse(true).build()),
            )
            .await
        {
            log::warn!("   ⚠️  Lookup index on users.verificationToken not created: {}", e);
        }
        self.create_sort_index(USERS_COLLECTION, doc! { "createdAt": -1 }).await;
        self.create_sort_index(REFERRALS_COLLECTION, doc! { "createdBy": 1, "createdAt": -1 }).await;
        self.create_sort_index(REFERRALS_COLLECTION, doc! { "createdAt": -1 }).await;

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn health_check(&self) -> bool {
        self.db.run_command(doc! { "ping": 1 }).await.is_ok()
    }
}
