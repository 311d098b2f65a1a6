pub mod checkout;
pub mod root;
pub mod settings;
pub mod stats;
pub mod webhooks;
