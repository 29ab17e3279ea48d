//! Database query functions for the `restaurants` table.

use anyhow::{Context, Result};
use chrono::NaiveTime;
use sqlx::PgExecutor;

use crate::models::Restaurant;

/// Fields for a new restaurant row.
#[derive(Debug, Clone)]
pub struct NewRestaurant<'a> {
    pub name: &'a str,
    pub address: &'a str,
    pub menu: &'a serde_json::Value,
    pub schedule_open: NaiveTime,
    pub schedule_close: NaiveTime,
}

pub async fn insert_restaurant<'e>(
    executor: impl PgExecutor<'e>,
    new: &NewRestaurant<'_>,
) -> Result<Restaurant> {
    let restaurant = sqlx::query_as::<_, Restaurant>(
        "INSERT INTO restaurants (name, address, menu, schedule_open, schedule_close) \
         VALUES ($1, $2, $3, $4, $5) \
         RETURNING *",
    )
    .bind(new.name)
    .bind(new.address)
    .bind(new.menu)
    .bind(new.schedule_open)
    .bind(new.schedule_close)
    .fetch_one(executor)
    .await
    .with_context(|| format!("failed to insert restaurant {:?}", new.name))?;

    Ok(restaurant)
}

/// A page of restaurants ordered by ID.
pub async fn list_restaurants<'e>(
    executor: impl PgExecutor<'e>,
    offset: i64,
    limit: i64,
) -> Result<Vec<Restaurant>> {
    let restaurants =
        sqlx::query_as::<_, Restaurant>("SELECT * FROM restaurants ORDER BY id OFFSET $1 LIMIT $2")
            .bind(offset)
            .bind(limit)
            .fetch_all(executor)
            .await
            .context("failed to list restaurants")?;

    Ok(restaurants)
}
