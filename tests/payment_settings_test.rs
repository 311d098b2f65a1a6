mod common;

use std::sync::Arc;

use alumnet::{
    domain::PaymentSettingsUpdate,
    error::{AppError, SettingsError},
    repository::SqlitePaymentSettingsRepository,
    service::PaymentSettingsService,
};

use common::{seed_tenant, setup_pool};

async fn service(pool: &sqlx::SqlitePool) -> PaymentSettingsService {
    seed_tenant(pool, "t1", "Midori Alumni", "midori").await;
    PaymentSettingsService::new(Arc::new(SqlitePaymentSettingsRepository::new(pool.clone())))
}

#[tokio::test]
async fn reads_synthesize_defaults_without_writing() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    let settings = service.get_settings("t1").await?;
    assert_eq!(settings.annual_fee_amount, 5000);
    assert_eq!(settings.donation_min_amount, 1000);
    assert_eq!(settings.donation_max_amount, 1_000_000);
    assert_eq!(settings.donation_presets, vec![1000, 3000, 5000, 10000]);
    assert!(settings.show_donor_list);
    assert!(settings.allow_anonymous);
    // No row was created by the read.
    assert_eq!(settings.created_at, None);
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payment_settings")
        .fetch_one(&pool)
        .await?;
    assert_eq!(count, 0);

    let err = service.get_settings("  ").await.unwrap_err();
    assert!(matches!(
        err,
        AppError::Settings(SettingsError::TenantRequired)
    ));

    Ok(())
}

#[tokio::test]
async fn update_merges_over_current_values() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                annual_fee_amount: Some(8000),
                ..Default::default()
            },
        )
        .await?;

    // A later patch touching a different field keeps the first change.
    let settings = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                donation_enabled: Some(true),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(settings.annual_fee_amount, 8000);
    assert!(settings.donation_enabled);
    assert!(settings.created_at.is_some());

    let reread = service.get_settings("t1").await?;
    assert_eq!(reread.annual_fee_amount, 8000);
    assert!(reread.donation_enabled);

    Ok(())
}

#[tokio::test]
async fn invalid_patch_leaves_row_untouched() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                donation_min_amount: Some(2000),
                donation_max_amount: Some(50_000),
                donation_presets: Some(vec![2000, 10_000]),
                ..Default::default()
            },
        )
        .await?;

    // Patch would make min exceed max against the stored row.
    let err = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                donation_min_amount: Some(60_000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Settings(SettingsError::MinAboveMax)));

    let settings = service.get_settings("t1").await?;
    assert_eq!(settings.donation_min_amount, 2000);
    assert_eq!(settings.donation_max_amount, 50_000);

    Ok(())
}

#[tokio::test]
async fn presets_are_checked_against_effective_range() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    let err = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                donation_min_amount: Some(2000),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    // Default presets include 1000, which falls below the new minimum.
    assert!(matches!(
        err,
        AppError::Settings(SettingsError::PresetOutOfRange { preset: 1000, .. })
    ));

    Ok(())
}

#[tokio::test]
async fn annual_fee_bounds_are_enforced() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    let err = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                annual_fee_amount: Some(-1),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Settings(SettingsError::NegativeAnnualFee)
    ));

    let err = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                annual_fee_amount: Some(10_000_001),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::Settings(SettingsError::AnnualFeeTooLarge(10_000_000))
    ));

    Ok(())
}

#[tokio::test]
async fn description_is_stripped_before_persistence() -> anyhow::Result<()> {
    let pool = setup_pool().await;
    let service = service(&pool).await;

    let settings = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                annual_fee_description: Some(Some(
                    "<b>2026 dues</b><script>alert('x')</script>".to_string(),
                )),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(settings.annual_fee_description.as_deref(), Some("2026 dues"));

    // Explicit null clears the stored description.
    let settings = service
        .update_settings(
            "t1",
            PaymentSettingsUpdate {
                annual_fee_description: Some(None),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(settings.annual_fee_description, None);

    Ok(())
}
