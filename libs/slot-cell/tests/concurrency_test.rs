// libs/slot-cell/tests/concurrency_test.rs
//
// Capacity accounting under concurrency: the check-and-reserve unit must
// hand out exactly the remaining capacity, never more, no matter how many
// requests race for it.

use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use futures::future::join_all;
use uuid::Uuid;

use shared_models::DomainError;
use shared_store::Table;
use slot_cell::models::{CreateSlotRequest, TimeSlot};
use slot_cell::services::SlotService;
use tokio_test::assert_ok;

fn slot_request(doctor_id: Uuid, capacity: u32) -> CreateSlotRequest {
    CreateSlotRequest {
        doctor_id,
        slot_date: NaiveDate::from_ymd_opt(2026, 9, 14).unwrap(),
        start_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
        end_time: NaiveTime::from_hms_opt(9, 30, 0).unwrap(),
        capacity,
    }
}

#[tokio::test]
async fn racing_reservations_fill_capacity_exactly_once() {
    let table: Arc<Table<TimeSlot>> = Arc::new(Table::new("time_slot"));
    let service = Arc::new(SlotService::new(Arc::clone(&table)));

    let capacity = 5;
    let contenders = 16;
    let slot = service
        .create_slot(slot_request(Uuid::new_v4(), capacity))
        .await
        .unwrap();

    let attempts = (0..contenders).map(|_| {
        let service = Arc::clone(&service);
        let slot_id = slot.id;
        tokio::spawn(async move { service.reserve(slot_id).await })
    });
    let outcomes: Vec<_> = join_all(attempts)
        .await
        .into_iter()
        .map(|joined| joined.expect("reservation task panicked"))
        .collect();

    let successes = outcomes.iter().filter(|o| o.is_ok()).count();
    let exhausted = outcomes
        .iter()
        .filter(|o| matches!(o, Err(DomainError::CapacityExhausted)))
        .count();

    assert_eq!(successes, capacity as usize);
    assert_eq!(exhausted, contenders - capacity as usize);

    let final_state = service.get_slot(slot.id).await.unwrap();
    assert_eq!(final_state.occupancy, capacity);
    assert!(final_state.is_booked);
}

#[tokio::test]
async fn interleaved_reserve_release_storm_keeps_occupancy_in_bounds() {
    let table: Arc<Table<TimeSlot>> = Arc::new(Table::new("time_slot"));
    let service = Arc::new(SlotService::new(Arc::clone(&table)));

    let capacity = 3;
    let slot = service
        .create_slot(slot_request(Uuid::new_v4(), capacity))
        .await
        .unwrap();

    // Each worker loops reserve-then-release; occupancy must never leave
    // [0, capacity] and a worker only releases a unit it actually holds.
    let workers = (0..8).map(|_| {
        let service = Arc::clone(&service);
        let slot_id = slot.id;
        tokio::spawn(async move {
            for _ in 0..25 {
                match service.reserve(slot_id).await {
                    Ok(reserved) => {
                        assert!(reserved.occupancy <= reserved.capacity);
                        assert_eq!(reserved.is_booked, reserved.occupancy == reserved.capacity);
                        let released = assert_ok!(service.release(slot_id).await);
                        assert!(released.occupancy < released.capacity);
                    }
                    Err(DomainError::CapacityExhausted) => {
                        tokio::task::yield_now().await;
                    }
                    Err(other) => panic!("unexpected reserve failure: {other}"),
                }
            }
        })
    });
    for joined in join_all(workers).await {
        joined.expect("storm worker panicked");
    }

    let final_state = service.get_slot(slot.id).await.unwrap();
    assert_eq!(final_state.occupancy, 0);
    assert!(!final_state.is_booked);
}
