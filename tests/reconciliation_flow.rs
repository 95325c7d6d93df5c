use std::str::FromStr;
use std::sync::Arc;

use chrono::{Datelike, Duration, Utc};
use rust_decimal::Decimal;
use tokio::sync::broadcast;
use uuid::Uuid;

use fuel_dispatch::config::DispatchSettings;
use fuel_dispatch::models::{
    Assignment, Caller, ClientAssignmentStatus, DischargeStatus, DomainEvent, FuelType,
    MeterReadings, Truck, TruckState, UserRole,
};
use fuel_dispatch::repositories::{FuelStore, MemoryFuelStore};
use fuel_dispatch::services::{EventPublisher, IdentifierPrefix, NewTruck, ReconciliationService};
use fuel_dispatch::utils::errors::AppError;

fn dec(value: &str) -> Decimal {
    Decimal::from_str(value).unwrap()
}

struct Fixture {
    store: Arc<MemoryFuelStore>,
    service: ReconciliationService<MemoryFuelStore>,
    admin: Caller,
    driver: Caller,
    truck: Truck,
    assignment: Assignment,
}

impl Fixture {
    async fn new(total_loaded: &str) -> Self {
        let store = Arc::new(MemoryFuelStore::new());
        let service = ReconciliationService::new(
            store.clone(),
            EventPublisher::default(),
            DispatchSettings::default(),
        );
        let admin = Caller::new(Uuid::new_v4(), UserRole::Admin);

        let truck = service
            .register_truck(
                &admin,
                NewTruck {
                    plate: "abc-123".to_string(),
                    fuel_type: FuelType::DieselB5,
                    capacity: dec("5000"),
                    last_remaining: Decimal::ZERO,
                },
            )
            .await
            .unwrap();
        let driver = service
            .register_driver(&admin, "Juan Pérez".to_string())
            .await
            .unwrap();
        let assignment = service
            .create_assignment(&admin, truck.id, driver.id, dec(total_loaded), vec![])
            .await
            .unwrap();

        Self {
            store,
            service,
            admin,
            driver: Caller::new(driver.id, UserRole::Operator),
            truck,
            assignment,
        }
    }

    async fn truck(&self) -> Truck {
        let mut tx = self.store.begin().await.unwrap();
        self.store.get_truck(&mut tx, self.truck.id).await.unwrap().unwrap()
    }

    async fn assignment(&self) -> Assignment {
        let mut tx = self.store.begin().await.unwrap();
        self.store
            .get_assignment(&mut tx, self.assignment.id)
            .await
            .unwrap()
            .unwrap()
    }
}

fn drain(receiver: &mut broadcast::Receiver<DomainEvent>) -> Vec<DomainEvent> {
    let mut events = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        events.push(event);
    }
    events
}

#[tokio::test]
async fn test_create_assignment_loads_truck() {
    let fx = Fixture::new("1000").await;

    assert!(fx.assignment.dispatch_number.starts_with("PETRUS-000001-"));
    assert_eq!(fx.assignment.total_remaining, dec("1000"));
    let truck = fx.truck().await;
    assert_eq!(truck.plate, "ABC-123");
    assert_eq!(truck.state, TruckState::Assigned);
    assert_eq!(truck.last_remaining, dec("1000"));
}

#[tokio::test]
async fn test_discharge_then_insufficient_fuel() {
    let fx = Fixture::new("1000").await;
    let customer = Uuid::new_v4();

    let discharge = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("300"), None)
        .await
        .unwrap();
    assert_eq!(discharge.vale_number, format!("PE-000001-{}", Utc::now().year()));
    assert_eq!(fx.assignment().await.total_remaining, dec("700"));

    let err = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("750"), None)
        .await
        .unwrap_err();
    match err {
        AppError::InsufficientFuel { requested, available } => {
            assert_eq!(requested, dec("750"));
            assert_eq!(available, dec("700"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    let assignment = fx.assignment().await;
    assert_eq!(assignment.total_remaining, dec("700"));
    assert!(!assignment.is_completed);
    let truck = fx.truck().await;
    assert_eq!(truck.state, TruckState::Unloading);
    assert_eq!(truck.last_remaining, dec("700"));
}

#[tokio::test]
async fn test_zero_and_negative_discharges_are_invalid() {
    let fx = Fixture::new("1000").await;
    for amount in ["0", "-5"] {
        let err = fx
            .service
            .record_discharge(&fx.driver, fx.assignment.id, Uuid::new_v4(), dec(amount), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidQuantity(_)));
    }
}

#[tokio::test]
async fn test_balance_is_conserved_across_discharges() {
    let fx = Fixture::new("1000").await;
    let mut delivered = Decimal::ZERO;

    for amount in ["120.5", "80.25", "300", "99.25", "0.001"] {
        fx.service
            .record_discharge(&fx.driver, fx.assignment.id, Uuid::new_v4(), dec(amount), None)
            .await
            .unwrap();
        delivered += dec(amount);

        let summary = fx.service.assignment_summary(&fx.driver, fx.assignment.id).await.unwrap();
        assert!(summary.balance_ok);
        assert_eq!(summary.total_discharged, delivered);
        assert_eq!(summary.assignment.total_remaining, dec("1000") - delivered);
        assert_eq!(fx.truck().await.last_remaining, summary.assignment.total_remaining);
    }
}

#[tokio::test]
async fn test_full_delivery_completes_assignment() {
    let fx = Fixture::new("500").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("500"))
        .await
        .unwrap();
    let mut events = fx.service.events().subscribe();

    let discharge = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("500"), None)
        .await
        .unwrap();

    assert_eq!(discharge.status, DischargeStatus::Finalized);
    let assignment = fx.assignment().await;
    assert!(assignment.is_completed);
    assert!(assignment.completed_at.is_some());
    assert_eq!(fx.truck().await.state, TruckState::Active);

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert_eq!(summary.client_assignments[0].status, ClientAssignmentStatus::Completed);
    assert_eq!(summary.client_assignments[0].remaining_quantity, Decimal::ZERO);

    let events = drain(&mut events);
    assert!(matches!(events[0], DomainEvent::DischargeRecorded { .. }));
    assert!(events
        .iter()
        .any(|e| matches!(e, DomainEvent::AssignmentCompleted { forced: false, .. })));
}

#[tokio::test]
async fn test_partial_delivery_keeps_allocation_pending() {
    let fx = Fixture::new("500").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("200"))
        .await
        .unwrap();

    fx.service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("150"), None)
        .await
        .unwrap();
    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    let allocation = &summary.client_assignments[0];
    assert_eq!(allocation.status, ClientAssignmentStatus::Pending);
    assert_eq!(allocation.delivered_quantity, dec("150"));
    assert_eq!(allocation.remaining_quantity, dec("50"));

    let err = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("60"), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        AppError::InsufficientFuel { available, .. } if available == dec("50")
    ));
}

#[tokio::test]
async fn test_allocation_bound_and_duplicates() {
    let fx = Fixture::new("500").await;
    let first = Uuid::new_v4();

    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, first, dec("250"))
        .await
        .unwrap();

    let err = fx
        .service
        .allocate_to_client(&fx.admin, fx.assignment.id, Uuid::new_v4(), dec("300"))
        .await
        .unwrap_err();
    match err {
        AppError::CapacityExceeded {
            requested,
            allocated,
            total_loaded,
        } => {
            assert_eq!(requested, dec("300"));
            assert_eq!(allocated, dec("250"));
            assert_eq!(total_loaded, dec("500"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, Uuid::new_v4(), dec("100"))
        .await
        .unwrap();

    let err = fx
        .service
        .allocate_to_client(&fx.admin, fx.assignment.id, first, dec("10"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::DuplicateAllocation { customer_id, .. } if customer_id == first));

    let err = fx
        .service
        .allocate_to_client(&fx.driver, fx.assignment.id, Uuid::new_v4(), dec("10"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_completion_requires_resolved_deliveries() {
    let fx = Fixture::new("500").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("200"))
        .await
        .unwrap();

    let err = fx
        .service
        .complete_assignment(&fx.driver, fx.assignment.id, false)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::IncompleteDeliveries { ref customers } if customers == &vec![customer]));

    let err = fx
        .service
        .complete_assignment(&fx.driver, fx.assignment.id, true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let completed = fx
        .service
        .complete_assignment(&fx.admin, fx.assignment.id, true)
        .await
        .unwrap();
    assert!(completed.is_completed);
    assert_eq!(fx.truck().await.state, TruckState::Active);

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert_eq!(summary.client_assignments[0].status, ClientAssignmentStatus::Expired);

    let err = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_other_driver_cannot_discharge() {
    let fx = Fixture::new("500").await;
    let intruder = Caller::new(Uuid::new_v4(), UserRole::Operator);

    let err = fx
        .service
        .record_discharge(&intruder, fx.assignment.id, Uuid::new_v4(), dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(fx.assignment().await.total_remaining, dec("500"));

    let err = fx
        .service
        .record_discharge(&fx.driver, Uuid::new_v4(), Uuid::new_v4(), dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_discharges_never_overdraw() {
    let fx = Fixture::new("1000").await;

    let handles: Vec<_> = (0..20)
        .map(|_| {
            let service = fx.service.clone();
            let driver = fx.driver;
            let assignment_id = fx.assignment.id;
            tokio::spawn(async move {
                service
                    .record_discharge(&driver, assignment_id, Uuid::new_v4(), dec("75"), None)
                    .await
            })
        })
        .collect();

    let mut vales = Vec::new();
    let mut rejected = 0;
    for result in futures::future::join_all(handles).await {
        match result.unwrap() {
            Ok(discharge) => vales.push(discharge.vale_number),
            Err(AppError::InsufficientFuel { .. }) => rejected += 1,
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }

    assert_eq!(vales.len(), 13);
    assert_eq!(rejected, 7);
    vales.sort();
    vales.dedup();
    assert_eq!(vales.len(), 13);

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert_eq!(summary.assignment.total_remaining, dec("25"));
    assert!(summary.balance_ok);
}

#[tokio::test]
async fn test_vale_numbers_start_at_one_per_year() {
    let fx = Fixture::new("100").await;
    let numbering = fx.service.numbering();

    assert_eq!(numbering.next(IdentifierPrefix::Vale, 2025).await.unwrap(), "PE-000001-2025");
    assert_eq!(numbering.next(IdentifierPrefix::Vale, 2025).await.unwrap(), "PE-000002-2025");
    assert_eq!(numbering.next(IdentifierPrefix::Vale, 2024).await.unwrap(), "PE-000001-2024");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_numbering_is_gap_free() {
    let fx = Fixture::new("100").await;

    let handles: Vec<_> = (0..50)
        .map(|_| {
            let numbering = fx.service.numbering().clone();
            tokio::spawn(async move { numbering.next(IdentifierPrefix::Vale, 2025).await })
        })
        .collect();

    let mut numbers: Vec<String> = futures::future::join_all(handles)
        .await
        .into_iter()
        .map(|r| r.unwrap().unwrap())
        .collect();
    numbers.sort();

    let expected: Vec<String> = (1..=50).map(|n| format!("PE-{:06}-2025", n)).collect();
    assert_eq!(numbers, expected);
}

#[tokio::test]
async fn test_stale_sweep_is_idempotent() {
    let fx = Fixture::new("800").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("300"))
        .await
        .unwrap();
    fx.service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("100"), None)
        .await
        .unwrap();

    let report = fx
        .service
        .sweep_stale_assignments_at(&fx.admin, Utc::now())
        .await
        .unwrap();
    assert_eq!(report.expired_assignments, 0);

    let later = Utc::now() + Duration::hours(25);
    let report = fx.service.sweep_stale_assignments_at(&fx.admin, later).await.unwrap();
    assert_eq!(report.expired_assignments, 1);
    assert_eq!(report.expired_allocations, 1);
    assert_eq!(report.finalized_discharges, 1);

    let after_first = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    let truck_after_first = fx.truck().await;
    assert!(after_first.assignment.is_completed);
    assert_eq!(truck_after_first.state, TruckState::Active);
    let allocation = &after_first.client_assignments[0];
    assert_eq!(allocation.status, ClientAssignmentStatus::Expired);
    assert_eq!(allocation.delivered_quantity, Decimal::ZERO);
    assert_eq!(allocation.remaining_quantity, Decimal::ZERO);
    assert!(after_first
        .discharges
        .iter()
        .all(|d| d.status == DischargeStatus::Finalized));

    let report = fx.service.sweep_stale_assignments_at(&fx.admin, later).await.unwrap();
    assert_eq!(report.expired_assignments, 0);
    assert_eq!(report.expired_allocations, 0);

    let after_second = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert_eq!(after_second.assignment, after_first.assignment);
    assert_eq!(after_second.client_assignments, after_first.client_assignments);
    assert_eq!(fx.truck().await, truck_after_first);

    let err = fx
        .service
        .sweep_stale_assignments_at(&fx.driver, later)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
}

#[tokio::test]
async fn test_fleet_refresh_heals_wrongly_completed_assignment() {
    let fx = Fixture::new("600").await;
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, Uuid::new_v4(), dec("200"))
        .await
        .unwrap();

    // Deriva: asignación cerrada a mano con una entrega pendiente
    let mut tx = fx.store.begin().await.unwrap();
    fx.store
        .set_assignment_completion(&mut tx, fx.assignment.id, Some(Utc::now()))
        .await
        .unwrap();
    fx.store
        .set_truck_state(&mut tx, fx.truck.id, TruckState::Active)
        .await
        .unwrap();
    fx.store.commit(tx).await.unwrap();

    let report = fx.service.refresh_fleet_state(&fx.admin).await.unwrap();
    assert_eq!(report.trucks_checked, 1);
    assert_eq!(report.assignments_reopened, 1);
    assert_eq!(report.trucks_updated, 1);
    assert!(!fx.assignment().await.is_completed);
    assert_eq!(fx.truck().await.state, TruckState::Assigned);

    let report = fx.service.refresh_fleet_state(&fx.admin).await.unwrap();
    assert_eq!(report.assignments_reopened, 0);
    assert_eq!(report.trucks_updated, 0);
}

#[tokio::test]
async fn test_fleet_refresh_releases_idle_truck() {
    let fx = Fixture::new("600").await;
    let idle = fx
        .service
        .register_truck(
            &fx.admin,
            NewTruck {
                plate: "IDLE-01".to_string(),
                fuel_type: FuelType::Custom("Bio Diesel".to_string()),
                capacity: dec("3000"),
                last_remaining: Decimal::ZERO,
            },
        )
        .await
        .unwrap();

    let mut tx = fx.store.begin().await.unwrap();
    fx.store
        .set_truck_state(&mut tx, idle.id, TruckState::Unloading)
        .await
        .unwrap();
    fx.store.commit(tx).await.unwrap();

    let report = fx.service.refresh_fleet_state(&fx.admin).await.unwrap();
    assert_eq!(report.trucks_checked, 2);
    assert_eq!(report.trucks_updated, 1);

    let mut tx = fx.store.begin().await.unwrap();
    let idle = fx.store.get_truck(&mut tx, idle.id).await.unwrap().unwrap();
    assert_eq!(idle.state, TruckState::Active);
}

#[tokio::test]
async fn test_delete_discharge_reverses_balance_and_reopens() {
    let fx = Fixture::new("400").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("400"))
        .await
        .unwrap();
    let discharge = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("400"), None)
        .await
        .unwrap();
    assert!(fx.assignment().await.is_completed);

    let err = fx
        .service
        .delete_discharge(&fx.driver, discharge.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let assignment = fx.service.delete_discharge(&fx.admin, discharge.id).await.unwrap();
    assert!(!assignment.is_completed);
    assert_eq!(assignment.total_remaining, dec("400"));

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert!(summary.discharges.is_empty());
    assert!(summary.balance_ok);
    let allocation = &summary.client_assignments[0];
    assert_eq!(allocation.status, ClientAssignmentStatus::Pending);
    assert_eq!(allocation.delivered_quantity, Decimal::ZERO);

    let truck = fx.truck().await;
    assert_eq!(truck.state, TruckState::Assigned);
    assert_eq!(truck.last_remaining, dec("400"));
}

#[tokio::test]
async fn test_correct_discharge_applies_delta() {
    let fx = Fixture::new("1000").await;
    let discharge = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, Uuid::new_v4(), dec("300"), None)
        .await
        .unwrap();

    let corrected = fx
        .service
        .correct_discharge(&fx.admin, discharge.id, dec("200"), None)
        .await
        .unwrap();
    assert_eq!(corrected.total_discharged, dec("200"));
    assert_eq!(corrected.vale_number, discharge.vale_number);
    assert_eq!(fx.assignment().await.total_remaining, dec("800"));

    fx.service
        .correct_discharge(&fx.admin, discharge.id, dec("900"), None)
        .await
        .unwrap();
    assert_eq!(fx.assignment().await.total_remaining, dec("100"));

    let err = fx
        .service
        .correct_discharge(&fx.admin, discharge.id, dec("1200"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InsufficientFuel { available, .. } if available == dec("1000")));

    let err = fx
        .service
        .correct_discharge(&fx.driver, discharge.id, dec("10"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert!(summary.balance_ok);
    assert_eq!(fx.truck().await.last_remaining, dec("100"));
}

#[tokio::test]
async fn test_meter_discrepancy_is_flagged_not_rejected() {
    let fx = Fixture::new("1000").await;
    let mut events = fx.service.events().subscribe();

    let within = fx
        .service
        .record_discharge(
            &fx.driver,
            fx.assignment.id,
            Uuid::new_v4(),
            dec("100"),
            Some(MeterReadings {
                marcador_inicial: dec("500"),
                marcador_final: dec("402"),
            }),
        )
        .await
        .unwrap();
    assert!(!within.meter_flagged);
    assert_eq!(within.cantidad_real, Some(dec("98")));

    let flagged = fx
        .service
        .record_discharge(
            &fx.driver,
            fx.assignment.id,
            Uuid::new_v4(),
            dec("100"),
            Some(MeterReadings {
                marcador_inicial: dec("402"),
                marcador_final: dec("352"),
            }),
        )
        .await
        .unwrap();
    assert!(flagged.meter_flagged);
    assert_eq!(fx.assignment().await.total_remaining, dec("800"));

    let discrepancies: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, DomainEvent::MeterDiscrepancy { .. }))
        .collect();
    assert_eq!(discrepancies.len(), 1);
}

#[tokio::test]
async fn test_one_open_assignment_per_truck() {
    let fx = Fixture::new("1000").await;
    let other_driver = fx
        .service
        .register_driver(&fx.admin, "María Quispe".to_string())
        .await
        .unwrap();

    let err = fx
        .service
        .create_assignment(&fx.admin, fx.truck.id, other_driver.id, dec("100"), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let err = fx
        .service
        .override_truck_state(&fx.admin, fx.truck.id, TruckState::Active)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let truck = fx
        .service
        .override_truck_state(&fx.admin, fx.truck.id, TruckState::Maintenance)
        .await
        .unwrap();
    assert_eq!(truck.state, TruckState::Maintenance);
}

#[tokio::test]
async fn test_assignment_cannot_exceed_truck_capacity() {
    let fx = Fixture::new("1000").await;
    let big = fx
        .service
        .register_truck(
            &fx.admin,
            NewTruck {
                plate: "SMALL-1".to_string(),
                fuel_type: FuelType::Glp,
                capacity: dec("500"),
                last_remaining: Decimal::ZERO,
            },
        )
        .await
        .unwrap();
    let driver = fx
        .service
        .register_driver(&fx.admin, "Luis Rojas".to_string())
        .await
        .unwrap();

    let err = fx
        .service
        .create_assignment(&fx.admin, big.id, driver.id, dec("501"), vec![])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidQuantity(_)));

    let err = fx
        .service
        .register_truck(
            &fx.admin,
            NewTruck {
                plate: "small-1".to_string(),
                fuel_type: FuelType::Glp,
                capacity: dec("500"),
                last_remaining: Decimal::ZERO,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));
}

#[tokio::test]
async fn test_deleting_unplanned_discharge_keeps_fulfilled_allocation() {
    let fx = Fixture::new("400").await;
    let customer = Uuid::new_v4();
    let allocation = fx
        .service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("100"))
        .await
        .unwrap();
    let planned = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("100"), None)
        .await
        .unwrap();
    let unplanned = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("50"), None)
        .await
        .unwrap();
    assert_eq!(planned.client_assignment_id, Some(allocation.id));
    assert_eq!(unplanned.client_assignment_id, None);

    let assignment = fx.service.delete_discharge(&fx.admin, unplanned.id).await.unwrap();
    assert_eq!(assignment.total_remaining, dec("300"));
    assert!(!assignment.is_completed);

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    let allocation = &summary.client_assignments[0];
    assert_eq!(allocation.status, ClientAssignmentStatus::Completed);
    assert_eq!(allocation.delivered_quantity, dec("100"));
    assert_eq!(allocation.remaining_quantity, Decimal::ZERO);
    assert!(summary.balance_ok);
}

#[tokio::test]
async fn test_discharge_recorded_before_allocation_is_not_reverted_from_it() {
    let fx = Fixture::new("1000").await;
    let customer = Uuid::new_v4();
    let early = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("200"), None)
        .await
        .unwrap();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("300"))
        .await
        .unwrap();

    fx.service
        .correct_discharge(&fx.admin, early.id, dec("150"), None)
        .await
        .unwrap();
    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    let allocation = &summary.client_assignments[0];
    assert_eq!(allocation.delivered_quantity, Decimal::ZERO);
    assert_eq!(allocation.remaining_quantity, dec("300"));
    assert_eq!(summary.assignment.total_remaining, dec("850"));

    fx.service.delete_discharge(&fx.admin, early.id).await.unwrap();
    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    let allocation = &summary.client_assignments[0];
    assert_eq!(allocation.status, ClientAssignmentStatus::Pending);
    assert_eq!(allocation.delivered_quantity, Decimal::ZERO);
    assert_eq!(allocation.remaining_quantity, dec("300"));
    assert_eq!(summary.assignment.total_remaining, dec("1000"));
}

#[tokio::test]
async fn test_delete_on_previous_assignment_conflicts_once_truck_moved_on() {
    let fx = Fixture::new("400").await;
    let customer = Uuid::new_v4();
    fx.service
        .allocate_to_client(&fx.admin, fx.assignment.id, customer, dec("400"))
        .await
        .unwrap();
    let discharge = fx
        .service
        .record_discharge(&fx.driver, fx.assignment.id, customer, dec("400"), None)
        .await
        .unwrap();
    assert!(fx.assignment().await.is_completed);

    let next_driver = fx
        .service
        .register_driver(&fx.admin, "Rosa Huamán".to_string())
        .await
        .unwrap();
    let next = fx
        .service
        .create_assignment(&fx.admin, fx.truck.id, next_driver.id, dec("500"), vec![])
        .await
        .unwrap();

    let err = fx
        .service
        .delete_discharge(&fx.admin, discharge.id)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Conflict(_)));

    let previous = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert!(previous.assignment.is_completed);
    assert_eq!(previous.assignment.total_remaining, Decimal::ZERO);
    assert_eq!(previous.discharges.len(), 1);
    assert_eq!(previous.client_assignments[0].status, ClientAssignmentStatus::Completed);

    let current = fx.service.assignment_summary(&fx.admin, next.id).await.unwrap();
    assert!(!current.assignment.is_completed);
    let truck = fx.truck().await;
    assert_eq!(truck.state, TruckState::Assigned);
    assert_eq!(truck.last_remaining, dec("500"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_stale_sweep_racing_discharges_keeps_ledger_consistent() {
    let fx = Fixture::new("1000").await;
    let later = Utc::now() + Duration::hours(25);

    let discharges: Vec<_> = (0..10)
        .map(|_| {
            let service = fx.service.clone();
            let driver = fx.driver;
            let assignment_id = fx.assignment.id;
            tokio::spawn(async move {
                service
                    .record_discharge(&driver, assignment_id, Uuid::new_v4(), dec("50"), None)
                    .await
            })
        })
        .collect();
    let sweep = {
        let service = fx.service.clone();
        let admin = fx.admin;
        tokio::spawn(async move { service.sweep_stale_assignments_at(&admin, later).await })
    };

    let mut delivered = Decimal::ZERO;
    for result in futures::future::join_all(discharges).await {
        match result.unwrap() {
            Ok(discharge) => delivered += discharge.total_discharged,
            Err(AppError::Conflict(_)) => {}
            Err(other) => panic!("unexpected error: {:?}", other),
        }
    }
    let report = sweep.await.unwrap().unwrap();
    assert_eq!(report.expired_assignments, 1);

    let summary = fx.service.assignment_summary(&fx.admin, fx.assignment.id).await.unwrap();
    assert!(summary.assignment.is_completed);
    assert!(summary.balance_ok);
    assert_eq!(summary.total_discharged, delivered);
    assert_eq!(summary.assignment.total_remaining, dec("1000") - delivered);
    assert!(summary
        .discharges
        .iter()
        .all(|d| d.status == DischargeStatus::Finalized));

    let truck = fx.truck().await;
    assert_eq!(truck.state, TruckState::Active);
    assert_eq!(truck.last_remaining, summary.assignment.total_remaining);
}
