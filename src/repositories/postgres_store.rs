//! Almacén PostgreSQL
//!
//! Implementación de `FuelStore` sobre sqlx. Las filas mutables se leen con
//! `FOR UPDATE`, el saldo se descuenta con un `UPDATE` condicional y los
//! contadores usan un upsert-incremento.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;
use uuid::Uuid;

use super::fuel_store::FuelStore;
use crate::models::assignment_note::{
    AssignmentNote, DeliveryDetail, DispatchStage, StageDocumentation, TripInfo,
};
use crate::models::{
    Assignment, AssignmentNoteRecord, ClientAssignment, Discharge, Driver, FuelType, Truck,
    TruckState,
};
use crate::utils::errors::{not_found_error, AppError, AppResult};

const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";
const UNIQUE_VIOLATION: &str = "23505";

/// Traduce errores de sqlx a la taxonomía del motor
fn db_error(err: sqlx::Error) -> AppError {
    if let Some(db) = err.as_database_error() {
        let code = db.code().map(|c| c.into_owned()).unwrap_or_default();
        if code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED {
            return AppError::ConcurrencyConflict(db.message().to_string());
        }
        if code == UNIQUE_VIOLATION {
            return match db.constraint() {
                Some("assignments_one_open_per_truck") => AppError::Conflict(
                    "El camión ya tiene una asignación abierta".to_string(),
                ),
                Some("trucks_plate_key") => {
                    AppError::Conflict("La placa ya está registrada".to_string())
                }
                Some("discharges_vale_number_key") => {
                    AppError::ConcurrencyConflict("Número de vale duplicado".to_string())
                }
                other => AppError::Conflict(format!(
                    "Registro duplicado ({})",
                    other.unwrap_or("unknown")
                )),
            };
        }
    }
    AppError::Database(err)
}

fn parse_fuel_type(raw: &str) -> AppResult<FuelType> {
    raw.parse()
        .map_err(|e: String| AppError::Internal(format!("fuel_type inválido en base de datos: {}", e)))
}

#[derive(Debug, sqlx::FromRow)]
struct TruckRow {
    id: Uuid,
    plate: String,
    fuel_type: String,
    capacity: Decimal,
    last_remaining: Decimal,
    state: TruckState,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TruckRow> for Truck {
    type Error = AppError;

    fn try_from(row: TruckRow) -> AppResult<Self> {
        Ok(Truck {
            id: row.id,
            plate: row.plate,
            fuel_type: parse_fuel_type(&row.fuel_type)?,
            capacity: row.capacity,
            last_remaining: row.last_remaining,
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct AssignmentRow {
    id: Uuid,
    dispatch_number: String,
    truck_id: Uuid,
    driver_id: Uuid,
    fuel_type: String,
    total_loaded: Decimal,
    total_remaining: Decimal,
    is_completed: bool,
    completed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AssignmentRow> for Assignment {
    type Error = AppError;

    fn try_from(row: AssignmentRow) -> AppResult<Self> {
        Ok(Assignment {
            id: row.id,
            dispatch_number: row.dispatch_number,
            truck_id: row.truck_id,
            driver_id: row.driver_id,
            fuel_type: parse_fuel_type(&row.fuel_type)?,
            total_loaded: row.total_loaded,
            total_remaining: row.total_remaining,
            is_completed: row.is_completed,
            completed_at: row.completed_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn assignments_from_rows(rows: Vec<AssignmentRow>) -> AppResult<Vec<Assignment>> {
    rows.into_iter().map(Assignment::try_from).collect()
}

#[derive(Debug, sqlx::FromRow)]
struct TripInfoRow {
    id: Uuid,
    assignment_id: Uuid,
    origin: String,
    destination: String,
    departed_at: Option<DateTime<Utc>>,
    odometer_start: Option<Decimal>,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct StageDocumentRow {
    id: Uuid,
    assignment_id: Uuid,
    stage: DispatchStage,
    photo_urls: Vec<String>,
    comment: Option<String>,
    recorded_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
struct DeliveryDetailRow {
    id: Uuid,
    assignment_id: Uuid,
    customer_id: Uuid,
    discharge_id: Option<Uuid>,
    comment: Option<String>,
    recorded_at: DateTime<Utc>,
}

const ASSIGNMENT_COLUMNS: &str = "id, dispatch_number, truck_id, driver_id, fuel_type, total_loaded, \
     total_remaining, is_completed, completed_at, created_at, updated_at";

#[derive(Clone)]
pub struct PgFuelStore {
    pool: PgPool,
}

impl PgFuelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

type PgTx = Transaction<'static, Postgres>;

#[async_trait]
impl FuelStore for PgFuelStore {
    type Tx = PgTx;

    async fn begin(&self) -> AppResult<PgTx> {
        self.pool.begin().await.map_err(db_error)
    }

    async fn commit(&self, tx: PgTx) -> AppResult<()> {
        tx.commit().await.map_err(db_error)
    }

    async fn rollback(&self, tx: PgTx) -> AppResult<()> {
        tx.rollback().await.map_err(db_error)
    }

    async fn insert_truck(&self, tx: &mut PgTx, truck: &Truck) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO trucks (id, plate, fuel_type, capacity, last_remaining, state, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(truck.id)
        .bind(&truck.plate)
        .bind(truck.fuel_type.to_string())
        .bind(truck.capacity)
        .bind(truck.last_remaining)
        .bind(truck.state)
        .bind(truck.created_at)
        .bind(truck.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_truck(&self, tx: &mut PgTx, id: Uuid) -> AppResult<Option<Truck>> {
        let row = sqlx::query_as::<_, TruckRow>("SELECT * FROM trucks WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)?;
        row.map(Truck::try_from).transpose()
    }

    async fn plate_exists(&self, tx: &mut PgTx, plate: &str) -> AppResult<bool> {
        let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM trucks WHERE plate = $1)")
            .bind(plate)
            .fetch_one(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(exists.0)
    }

    async fn list_trucks(&self, tx: &mut PgTx) -> AppResult<Vec<Truck>> {
        let rows = sqlx::query_as::<_, TruckRow>("SELECT * FROM trucks ORDER BY plate")
            .fetch_all(&mut **tx)
            .await
            .map_err(db_error)?;
        rows.into_iter().map(Truck::try_from).collect()
    }

    async fn update_truck_load(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        last_remaining: Decimal,
        state: TruckState,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE trucks SET last_remaining = $2, state = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(last_remaining)
        .bind(state)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("Truck", &id));
        }
        Ok(())
    }

    async fn set_truck_state(&self, tx: &mut PgTx, id: Uuid, state: TruckState) -> AppResult<()> {
        let result = sqlx::query("UPDATE trucks SET state = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(state)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("Truck", &id));
        }
        Ok(())
    }

    async fn insert_driver(&self, tx: &mut PgTx, driver: &Driver) -> AppResult<()> {
        sqlx::query("INSERT INTO drivers (id, name, state, created_at) VALUES ($1, $2, $3, $4)")
            .bind(driver.id)
            .bind(&driver.name)
            .bind(driver.state)
            .bind(driver.created_at)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        Ok(())
    }

    async fn get_driver(&self, tx: &mut PgTx, id: Uuid) -> AppResult<Option<Driver>> {
        sqlx::query_as::<_, Driver>("SELECT id, name, state, created_at FROM drivers WHERE id = $1")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)
    }

    async fn insert_assignment(&self, tx: &mut PgTx, assignment: &Assignment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO assignments (id, dispatch_number, truck_id, driver_id, fuel_type, total_loaded,
                                     total_remaining, is_completed, completed_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(assignment.id)
        .bind(&assignment.dispatch_number)
        .bind(assignment.truck_id)
        .bind(assignment.driver_id)
        .bind(assignment.fuel_type.to_string())
        .bind(assignment.total_loaded)
        .bind(assignment.total_remaining)
        .bind(assignment.is_completed)
        .bind(assignment.completed_at)
        .bind(assignment.created_at)
        .bind(assignment.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_assignment(&self, tx: &mut PgTx, id: Uuid) -> AppResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM assignments WHERE id = $1 FOR UPDATE",
            ASSIGNMENT_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;
        row.map(Assignment::try_from).transpose()
    }

    async fn open_assignment_for_truck(
        &self,
        tx: &mut PgTx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM assignments WHERE truck_id = $1 AND NOT is_completed \
             ORDER BY created_at DESC LIMIT 1",
            ASSIGNMENT_COLUMNS
        ))
        .bind(truck_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;
        row.map(Assignment::try_from).transpose()
    }

    async fn latest_assignment_for_truck(
        &self,
        tx: &mut PgTx,
        truck_id: Uuid,
    ) -> AppResult<Option<Assignment>> {
        let row = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM assignments WHERE truck_id = $1 ORDER BY created_at DESC LIMIT 1 FOR UPDATE",
            ASSIGNMENT_COLUMNS
        ))
        .bind(truck_id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;
        row.map(Assignment::try_from).transpose()
    }

    async fn list_open_assignments_created_before(
        &self,
        tx: &mut PgTx,
        cutoff: DateTime<Utc>,
    ) -> AppResult<Vec<Assignment>> {
        let rows = sqlx::query_as::<_, AssignmentRow>(&format!(
            "SELECT {} FROM assignments WHERE NOT is_completed AND created_at < $1 ORDER BY created_at",
            ASSIGNMENT_COLUMNS
        ))
        .bind(cutoff)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;
        assignments_from_rows(rows)
    }

    async fn try_decrement_remaining(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        amount: Decimal,
    ) -> AppResult<Option<Decimal>> {
        let remaining = sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE assignments
            SET total_remaining = total_remaining - $2, updated_at = NOW()
            WHERE id = $1 AND NOT is_completed AND total_remaining >= $2
            RETURNING total_remaining
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?;
        debug!("⛽ Decremento condicional en {}: {:?}", id, remaining);
        Ok(remaining)
    }

    async fn restore_remaining(&self, tx: &mut PgTx, id: Uuid, amount: Decimal) -> AppResult<Decimal> {
        sqlx::query_scalar::<_, Decimal>(
            r#"
            UPDATE assignments
            SET total_remaining = LEAST(total_remaining + $2, total_loaded), updated_at = NOW()
            WHERE id = $1
            RETURNING total_remaining
            "#,
        )
        .bind(id)
        .bind(amount)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db_error)?
        .ok_or_else(|| not_found_error("Assignment", &id))
    }

    async fn set_assignment_completion(
        &self,
        tx: &mut PgTx,
        id: Uuid,
        completed_at: Option<DateTime<Utc>>,
    ) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE assignments SET is_completed = $2, completed_at = $3, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(completed_at.is_some())
        .bind(completed_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("Assignment", &id));
        }
        Ok(())
    }

    async fn insert_client_assignment(&self, tx: &mut PgTx, ca: &ClientAssignment) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO client_assignments (id, assignment_id, customer_id, allocated_quantity,
                                            delivered_quantity, remaining_quantity, status, created_at, completed_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(ca.id)
        .bind(ca.assignment_id)
        .bind(ca.customer_id)
        .bind(ca.allocated_quantity)
        .bind(ca.delivered_quantity)
        .bind(ca.remaining_quantity)
        .bind(ca.status)
        .bind(ca.created_at)
        .bind(ca.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(|e| match db_error(e) {
            AppError::Conflict(_) => AppError::DuplicateAllocation {
                assignment_id: ca.assignment_id,
                customer_id: ca.customer_id,
            },
            other => other,
        })?;
        Ok(())
    }

    async fn list_client_assignments(
        &self,
        tx: &mut PgTx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<ClientAssignment>> {
        sqlx::query_as::<_, ClientAssignment>(
            "SELECT * FROM client_assignments WHERE assignment_id = $1 ORDER BY created_at FOR UPDATE",
        )
        .bind(assignment_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn update_client_assignment(&self, tx: &mut PgTx, ca: &ClientAssignment) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE client_assignments
            SET delivered_quantity = $2, remaining_quantity = $3, status = $4, completed_at = $5
            WHERE id = $1
            "#,
        )
        .bind(ca.id)
        .bind(ca.delivered_quantity)
        .bind(ca.remaining_quantity)
        .bind(ca.status)
        .bind(ca.completed_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("ClientAssignment", &ca.id));
        }
        Ok(())
    }

    async fn insert_discharge(&self, tx: &mut PgTx, discharge: &Discharge) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO discharges (id, vale_number, assignment_id, customer_id, client_assignment_id,
                                    total_discharged, status, marcador_inicial, marcador_final,
                                    cantidad_real, meter_flagged, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(discharge.id)
        .bind(&discharge.vale_number)
        .bind(discharge.assignment_id)
        .bind(discharge.customer_id)
        .bind(discharge.client_assignment_id)
        .bind(discharge.total_discharged)
        .bind(discharge.status)
        .bind(discharge.marcador_inicial)
        .bind(discharge.marcador_final)
        .bind(discharge.cantidad_real)
        .bind(discharge.meter_flagged)
        .bind(discharge.created_at)
        .bind(discharge.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(())
    }

    async fn get_discharge(&self, tx: &mut PgTx, id: Uuid) -> AppResult<Option<Discharge>> {
        sqlx::query_as::<_, Discharge>("SELECT * FROM discharges WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
            .map_err(db_error)
    }

    async fn list_discharges(&self, tx: &mut PgTx, assignment_id: Uuid) -> AppResult<Vec<Discharge>> {
        sqlx::query_as::<_, Discharge>(
            "SELECT * FROM discharges WHERE assignment_id = $1 ORDER BY created_at",
        )
        .bind(assignment_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn update_discharge(&self, tx: &mut PgTx, discharge: &Discharge) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE discharges
            SET total_discharged = $2, status = $3, marcador_inicial = $4, marcador_final = $5,
                cantidad_real = $6, meter_flagged = $7, updated_at = $8
            WHERE id = $1
            "#,
        )
        .bind(discharge.id)
        .bind(discharge.total_discharged)
        .bind(discharge.status)
        .bind(discharge.marcador_inicial)
        .bind(discharge.marcador_final)
        .bind(discharge.cantidad_real)
        .bind(discharge.meter_flagged)
        .bind(discharge.updated_at)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("Discharge", &discharge.id));
        }
        Ok(())
    }

    async fn delete_discharge(&self, tx: &mut PgTx, id: Uuid) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM discharges WHERE id = $1")
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(db_error)?;
        if result.rows_affected() == 0 {
            return Err(not_found_error("Discharge", &id));
        }
        Ok(())
    }

    async fn finalize_discharges(&self, tx: &mut PgTx, assignment_id: Uuid) -> AppResult<u64> {
        let result = sqlx::query(
            "UPDATE discharges SET status = 'finalized', updated_at = NOW() \
             WHERE assignment_id = $1 AND status = 'pending'",
        )
        .bind(assignment_id)
        .execute(&mut **tx)
        .await
        .map_err(db_error)?;
        Ok(result.rows_affected())
    }

    async fn next_counter(&self, tx: &mut PgTx, prefix: &str, year: i32) -> AppResult<i64> {
        sqlx::query_scalar::<_, i64>(
            r#"
            INSERT INTO numbering_counters (prefix, year, last_value)
            VALUES ($1, $2, 1)
            ON CONFLICT (prefix, year)
            DO UPDATE SET last_value = numbering_counters.last_value + 1
            RETURNING last_value
            "#,
        )
        .bind(prefix)
        .bind(year)
        .fetch_one(&mut **tx)
        .await
        .map_err(db_error)
    }

    async fn insert_note(&self, tx: &mut PgTx, record: &AssignmentNoteRecord) -> AppResult<()> {
        let query = match &record.note {
            AssignmentNote::Trip(trip) => sqlx::query(
                r#"
                INSERT INTO assignment_trip_infos (id, assignment_id, origin, destination, departed_at,
                                                   odometer_start, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.id)
            .bind(record.assignment_id)
            .bind(&trip.origin)
            .bind(&trip.destination)
            .bind(trip.departed_at)
            .bind(trip.odometer_start)
            .bind(record.recorded_at),
            AssignmentNote::Stage(stage) => sqlx::query(
                r#"
                INSERT INTO assignment_stage_documents (id, assignment_id, stage, photo_urls, comment, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(record.assignment_id)
            .bind(stage.stage)
            .bind(&stage.photo_urls)
            .bind(&stage.comment)
            .bind(record.recorded_at),
            AssignmentNote::Delivery(delivery) => sqlx::query(
                r#"
                INSERT INTO assignment_delivery_details (id, assignment_id, customer_id, discharge_id,
                                                         comment, recorded_at)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(record.id)
            .bind(record.assignment_id)
            .bind(delivery.customer_id)
            .bind(delivery.discharge_id)
            .bind(&delivery.comment)
            .bind(record.recorded_at),
        };
        query.execute(&mut **tx).await.map_err(db_error)?;
        Ok(())
    }

    async fn list_notes(
        &self,
        tx: &mut PgTx,
        assignment_id: Uuid,
    ) -> AppResult<Vec<AssignmentNoteRecord>> {
        let trips = sqlx::query_as::<_, TripInfoRow>(
            "SELECT * FROM assignment_trip_infos WHERE assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;
        let stages = sqlx::query_as::<_, StageDocumentRow>(
            "SELECT * FROM assignment_stage_documents WHERE assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;
        let deliveries = sqlx::query_as::<_, DeliveryDetailRow>(
            "SELECT * FROM assignment_delivery_details WHERE assignment_id = $1",
        )
        .bind(assignment_id)
        .fetch_all(&mut **tx)
        .await
        .map_err(db_error)?;

        let mut notes: Vec<AssignmentNoteRecord> = trips
            .into_iter()
            .map(|row| AssignmentNoteRecord {
                id: row.id,
                assignment_id: row.assignment_id,
                recorded_at: row.recorded_at,
                note: AssignmentNote::Trip(TripInfo {
                    origin: row.origin,
                    destination: row.destination,
                    departed_at: row.departed_at,
                    odometer_start: row.odometer_start,
                }),
            })
            .chain(stages.into_iter().map(|row| AssignmentNoteRecord {
                id: row.id,
                assignment_id: row.assignment_id,
                recorded_at: row.recorded_at,
                note: AssignmentNote::Stage(StageDocumentation {
                    stage: row.stage,
                    photo_urls: row.photo_urls,
                    comment: row.comment,
                }),
            }))
            .chain(deliveries.into_iter().map(|row| AssignmentNoteRecord {
                id: row.id,
                assignment_id: row.assignment_id,
                recorded_at: row.recorded_at,
                note: AssignmentNote::Delivery(DeliveryDetail {
                    customer_id: row.customer_id,
                    discharge_id: row.discharge_id,
                    comment: row.comment,
                }),
            }))
            .collect();
        notes.sort_by_key(|n| n.recorded_at);
        Ok(notes)
    }
}
