pub mod amount;
pub mod checkout;
pub mod gateway;
pub mod stats;
pub mod webhook;

pub use checkout::{CheckoutService, CheckoutSessionResponse, CreateCheckoutRequest};
pub use gateway::{CheckoutGateway, CreateSessionRequest, CreatedSession, SessionDetails, StripeGateway};
pub use stats::{DonorQuery, StatsPeriod, StatsQuery, StatsService};
pub use webhook::{WebhookEvent, WebhookReconciler, WebhookResult};
