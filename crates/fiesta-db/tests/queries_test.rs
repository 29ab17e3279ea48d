//! Integration tests for the holiday, guest and restaurant query functions.

use chrono::NaiveTime;
use serde_json::json;

use fiesta_db::models::{GuestDocument, GuestSummary, STATUS_PENDING};
use fiesta_db::queries::holidays::{HolidayChanges, NewHoliday};
use fiesta_db::queries::restaurants::NewRestaurant;
use fiesta_db::queries::{guests, holidays, restaurants};
use fiesta_test_utils::{create_test_db, drop_test_db};

fn party() -> NewHoliday<'static> {
    NewHoliday {
        theme: "Birthday",
        details: "Cake at eight",
        latitude: Some(55.75),
        longitude: Some(37.61),
        location_address: Some("Red Square"),
    }
}

#[tokio::test]
async fn insert_and_get_holiday() {
    let (pool, db_name) = create_test_db().await;

    let created = holidays::insert_holiday(&pool, &party()).await.unwrap();
    assert_eq!(created.theme, "Birthday");
    assert_eq!(created.guests_count, 0);
    assert_eq!(created.guests.0, GuestDocument::with_default_buckets());

    let fetched = holidays::get_holiday(&pool, created.id)
        .await
        .unwrap()
        .expect("holiday should exist");
    assert_eq!(fetched.location_address.as_deref(), Some("Red Square"));
    assert_eq!(fetched.latitude, Some(55.75));

    assert!(holidays::get_holiday(&pool, created.id + 1).await.unwrap().is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn list_holidays_pages_in_insertion_order() {
    let (pool, db_name) = create_test_db().await;

    for theme in ["a", "b", "c"] {
        holidays::insert_holiday(
            &pool,
            &NewHoliday {
                theme,
                details: "x",
                ..Default::default()
            },
        )
        .await
        .unwrap();
    }

    let page = holidays::list_holidays(&pool, 1, 5).await.unwrap();
    let themes: Vec<&str> = page.iter().map(|h| h.theme.as_str()).collect();
    assert_eq!(themes, ["b", "c"]);

    let first = holidays::list_holidays(&pool, 0, 1).await.unwrap();
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].theme, "a");

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn update_holiday_touches_only_supplied_fields() {
    let (pool, db_name) = create_test_db().await;

    let created = holidays::insert_holiday(&pool, &party()).await.unwrap();
    let updated = holidays::update_holiday(
        &pool,
        created.id,
        &HolidayChanges {
            details: Some("Cake at nine"),
            ..Default::default()
        },
    )
    .await
    .unwrap()
    .expect("holiday should exist");

    assert_eq!(updated.theme, "Birthday");
    assert_eq!(updated.details, "Cake at nine");
    assert_eq!(updated.location_address.as_deref(), Some("Red Square"));
    assert!(updated.updated_at >= created.updated_at);

    let missing = holidays::update_holiday(&pool, created.id + 100, &HolidayChanges::default())
        .await
        .unwrap();
    assert!(missing.is_none());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn save_guest_document_roundtrips() {
    let (pool, db_name) = create_test_db().await;

    let created = holidays::insert_holiday(&pool, &party()).await.unwrap();
    let mut doc = created.guests.0.clone();
    doc.push(STATUS_PENDING, GuestSummary::new("Alice", Some("77")))
        .unwrap();
    holidays::save_guest_document(&pool, created.id, &doc, 1)
        .await
        .unwrap();

    let fetched = holidays::get_holiday(&pool, created.id).await.unwrap().unwrap();
    assert_eq!(fetched.guests_count, 1);
    assert_eq!(
        serde_json::to_value(&fetched.guests).unwrap(),
        json!({"pending": [{"name": "Alice", "telegram_id": "77"}], "confirmed": []})
    );

    let err = holidays::save_guest_document(&pool, created.id + 1, &doc, 1).await;
    assert!(err.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn externally_edited_document_still_reads() {
    let (pool, db_name) = create_test_db().await;

    let odd = holidays::insert_holiday(&pool, &party()).await.unwrap();
    holidays::insert_holiday(&pool, &party()).await.unwrap();
    let raw = json!({
        "pending": [null, {"nick": "x"}, {"name": "Ivan", "telegram_id": 123}],
        "note": "x"
    });
    sqlx::query("UPDATE holidays SET guests = $1 WHERE id = $2")
        .bind(&raw)
        .bind(odd.id)
        .execute(&pool)
        .await
        .unwrap();

    let fetched = holidays::get_holiday(&pool, odd.id).await.unwrap().unwrap();
    assert_eq!(serde_json::to_value(&fetched.guests).unwrap(), raw);
    assert_eq!(fetched.guests.0.total(), 3);

    let all = holidays::list_holidays(&pool, 0, 10).await.unwrap();
    assert_eq!(all.len(), 2);

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn guest_status_and_delete() {
    let (pool, db_name) = create_test_db().await;

    let holiday = holidays::insert_holiday(&pool, &party()).await.unwrap();
    let guest = guests::insert_guest(&pool, holiday.id, "Bob", Some("12"), "pending")
        .await
        .unwrap();
    assert_eq!(guest.telegram_id.as_deref(), Some("12"));

    let moved = guests::set_guest_status(&pool, guest.id, "confirmed")
        .await
        .unwrap();
    assert_eq!(moved.status, "confirmed");

    let listed = guests::list_guests_for_holiday(&pool, holiday.id).await.unwrap();
    assert_eq!(listed.len(), 1);

    assert!(guests::delete_guest(&pool, guest.id).await.unwrap());
    assert!(!guests::delete_guest(&pool, guest.id).await.unwrap());
    assert!(guests::set_guest_status(&pool, guest.id, "pending").await.is_err());

    pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn restaurants_page() {
    let (pool, db_name) = create_test_db().await;

    let menu = json!({"mains": ["pelmeni", "borscht"]});
    for name in ["Pushkin", "Varenichnaya"] {
        restaurants::insert_restaurant(
            &pool,
            &NewRestaurant {
                name,
                address: "Tverskoy Blvd",
                menu: &menu,
                schedule_open: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                schedule_close: NaiveTime::from_hms_opt(23, 30, 0).unwrap(),
            },
        )
        .await
        .unwrap();
    }

    let all = restaurants::list_restaurants(&pool, 0, 100).await.unwrap();
    assert_eq!(all.len(), 2);
    assert_eq!(all[0].menu, menu);
    assert_eq!(all[1].schedule_close, NaiveTime::from_hms_opt(23, 30, 0).unwrap());

    let second = restaurants::list_restaurants(&pool, 1, 1).await.unwrap();
    assert_eq!(second[0].name, "Varenichnaya");

    pool.close().await;
    drop_test_db(&db_name).await;
}
