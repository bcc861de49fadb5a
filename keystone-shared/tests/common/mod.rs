/// Shared fixtures for database-backed tests
///
/// Tests that need PostgreSQL call [`TestEnv::new`], which returns `None`
/// when `DATABASE_URL` is unset so the suite still passes without a
/// database. Every fixture uses fresh random emails and names, so tests can
/// run in parallel against one database.
#[allow(dead_code)]
pub mod fixtures {
    use async_trait::async_trait;
    use keystone_shared::auth::authorization::OrgActor;
    use keystone_shared::billing::{BillingError, CheckoutRequest, CheckoutSession, PaymentGateway};
    use keystone_shared::db::migrations::run_migrations;
    use keystone_shared::db::pool::{create_pool, DatabaseConfig};
    use keystone_shared::email::MemoryEmailSender;
    use keystone_shared::models::membership::MembershipRole;
    use keystone_shared::rate_limit::RateLimiters;
    use keystone_shared::services::accounts::{self, RegisterInput, Session};
    use keystone_shared::services::{ServiceContext, ServiceSettings};
    use keystone_shared::storage::MemoryStorage;
    use std::sync::{Arc, Mutex};
    use uuid::Uuid;

    pub const PASSWORD: &str = "Sup3r-Secret!";
    pub const JWT_SECRET: &str = "test-secret-key-at-least-32-bytes-long";
    pub const WEBHOOK_SECRET: &str = "whsec_test_secret";

    /// Records checkout and cancel calls instead of reaching a provider
    #[derive(Debug, Default)]
    pub struct RecordingGateway {
        pub checkouts: Mutex<Vec<CheckoutRequest>>,
        pub cancellations: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PaymentGateway for RecordingGateway {
        fn name(&self) -> &'static str {
            "recording"
        }

        async fn create_checkout_session(
            &self,
            request: &CheckoutRequest,
        ) -> Result<CheckoutSession, BillingError> {
            self.checkouts.lock().unwrap().push(request.clone());
            Ok(CheckoutSession {
                id: "cs_test_1".to_string(),
                url: "https://pay.example.com/cs_test_1".to_string(),
            })
        }

        async fn cancel_subscription(
            &self,
            provider_subscription_id: &str,
            _at_period_end: bool,
        ) -> Result<(), BillingError> {
            self.cancellations
                .lock()
                .unwrap()
                .push(provider_subscription_id.to_string());
            Ok(())
        }
    }

    pub struct TestEnv {
        pub ctx: ServiceContext,
        pub storage: Arc<MemoryStorage>,
        pub mailer: Arc<MemoryEmailSender>,
        pub payments: Arc<RecordingGateway>,
    }

    impl TestEnv {
        pub async fn new() -> Option<Self> {
            Self::with_limiters(RateLimiters::default()).await
        }

        pub async fn with_limiters(limiters: RateLimiters) -> Option<Self> {
            let url = std::env::var("DATABASE_URL").ok()?;
            let pool = create_pool(DatabaseConfig {
                max_connections: 5,
                ..DatabaseConfig::with_url(url)
            })
            .await
            .expect("connect to test database");
            run_migrations(&pool).await.expect("run migrations");

            let storage = Arc::new(MemoryStorage::new());
            let mailer = Arc::new(MemoryEmailSender::new());
            let payments = Arc::new(RecordingGateway::default());

            let mut settings = ServiceSettings::new("https://app.example.com", JWT_SECRET);
            settings.webhook_secret = Some(WEBHOOK_SECRET.to_string());

            let ctx = ServiceContext {
                db: pool,
                storage: storage.clone(),
                mailer: mailer.clone(),
                payments: payments.clone(),
                limiters,
                settings: Arc::new(settings),
            };

            Some(Self {
                ctx,
                storage,
                mailer,
                payments,
            })
        }

        /// Registers a user with a personal organization they own.
        pub async fn register(&self, name: &str) -> Session {
            accounts::register(
                &self.ctx,
                RegisterInput {
                    email: unique_email(name),
                    password: PASSWORD.to_string(),
                    name: Some(name.to_string()),
                    organization_name: None,
                },
            )
            .await
            .expect("register user")
        }
    }

    pub fn unique_email(name: &str) -> String {
        format!("{}-{}@example.com", name.to_lowercase(), Uuid::new_v4().simple())
    }

    /// Actor for a registered user in their personal organization.
    pub fn owner_actor(session: &Session) -> OrgActor {
        actor(session, session.organization_id.expect("personal organization"), MembershipRole::Owner)
    }

    pub fn actor(session: &Session, organization_id: Uuid, role: MembershipRole) -> OrgActor {
        OrgActor {
            user_id: session.user.id,
            organization_id,
            role,
            via_platform_admin: false,
        }
    }
}
