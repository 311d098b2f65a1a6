pub mod payment_settings_service;

pub use payment_settings_service::PaymentSettingsService;
