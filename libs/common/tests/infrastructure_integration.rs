//! Integration tests for the infrastructure components
//!
//! These tests verify that the PostgreSQL database and the Redis broker
//! are properly configured and reachable from the application.

use common::{
    broker::{RedisConfig, RedisPool},
    database::{DatabaseConfig, health_check, init_pool, run_migrations},
};
use futures::StreamExt;
use sqlx::Row;
use std::time::Duration;

/// Verifies both PostgreSQL and Redis are accessible and can perform
/// basic operations
#[tokio::test]
#[ignore = "requires running PostgreSQL and Redis instances"]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::from_env()?;
    let pool = init_pool(&db_config).await?;

    assert!(health_check(&pool).await?, "Database health check failed");
    run_migrations(&pool).await?;

    let row = sqlx::query("SELECT 1 as result").fetch_one(&pool).await?;
    let result: i32 = row.get("result");
    assert_eq!(result, 1, "PostgreSQL simple query test failed");

    let redis_config = RedisConfig::from_env()?;
    let redis_pool = RedisPool::new(&redis_config).await?;

    assert!(
        redis_pool.health_check().await?,
        "Redis health check failed"
    );

    let mut messages = redis_pool
        .subscribe_pattern("integration_test:*")
        .await?;
    redis_pool
        .publish("integration_test:bob@example.com", "[]")
        .await?;

    let received = tokio::time::timeout(Duration::from_secs(2), messages.next()).await?;
    assert_eq!(
        received,
        Some((
            "integration_test:bob@example.com".to_string(),
            "[]".to_string()
        )),
        "Redis publish/subscribe test failed"
    );

    Ok(())
}
