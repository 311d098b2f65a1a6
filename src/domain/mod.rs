pub mod payment;
pub mod payment_settings;
pub mod tenant;

pub use payment::{Payment, PaymentStatus, PaymentType};
pub use payment_settings::{strip_html, PaymentSettings, PaymentSettingsUpdate, MAX_ANNUAL_FEE_AMOUNT};
pub use tenant::Tenant;
