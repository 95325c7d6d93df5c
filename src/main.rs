use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use dotenvy::dotenv;
use tokio::signal;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{error, info, warn};

use fuel_dispatch::config::{EnvironmentConfig, StorageBackend};
use fuel_dispatch::database::DatabaseConnection;
use fuel_dispatch::models::{Caller, DomainEvent};
use fuel_dispatch::repositories::{FuelStore, MemoryFuelStore, PgFuelStore};
use fuel_dispatch::routes::create_app_router;
use fuel_dispatch::services::{EventPublisher, ReconciliationService};
use fuel_dispatch::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Cargar variables de entorno
    dotenv().ok();
    let config = EnvironmentConfig::from_env()?;

    // Configurar logging
    let level = if config.is_development() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt().with_max_level(level).init();

    info!("⛽ Fuel Dispatch - Motor de reconciliación de combustible");
    info!("=========================================================");

    match config.storage_backend {
        StorageBackend::Postgres => {
            let db_connection = match DatabaseConnection::new_default().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("❌ Error conectando a la base de datos: {}", e);
                    return Err(e);
                }
            };
            db_connection.run_migrations().await?;
            serve(PgFuelStore::new(db_connection.pool().clone()), config).await
        }
        StorageBackend::Memory => {
            warn!("⚠️ STORAGE_BACKEND=memory: los datos se pierden al reiniciar");
            serve(MemoryFuelStore::new(), config).await
        }
    }
}

async fn serve<S: FuelStore>(store: S, config: EnvironmentConfig) -> Result<()> {
    let events = EventPublisher::default();
    tokio::spawn(log_domain_events(events.subscribe()));

    let service = ReconciliationService::new(Arc::new(store), events, config.dispatch.clone());
    if let Some(secs) = config.sweep_interval_secs.filter(|s| *s > 0) {
        info!("🧹 Barridos programados cada {}s", secs);
        tokio::spawn(run_periodic_sweeps(service.clone(), Duration::from_secs(secs)));
    }

    let addr: SocketAddr = config.server_url().parse()?;
    let app = create_app_router(AppState::new(service, config));

    info!("🌐 Servidor iniciando en http://{}", addr);
    info!("🔍 Endpoints disponibles:");
    info!("   GET  /health - Health check");
    info!("🚚 Flota:");
    info!("   POST /api/trucks - Registrar camión");
    info!("   PUT  /api/trucks/:id/state - Override de estado");
    info!("   POST /api/drivers - Registrar conductor");
    info!("⛽ Asignaciones:");
    info!("   POST /api/assignments - Crear asignación");
    info!("   GET  /api/assignments/:id - Resumen y balance");
    info!("   POST /api/assignments/:id/allocations - Asignar a cliente");
    info!("   POST /api/assignments/:id/discharges - Registrar descarga");
    info!("   POST /api/assignments/:id/complete - Completar asignación");
    info!("   POST /api/assignments/:id/notes - Agregar nota");
    info!("   GET  /api/assignments/:id/notes - Listar notas");
    info!("   PUT  /api/discharges/:id - Corregir descarga");
    info!("   DELETE /api/discharges/:id - Eliminar descarga");
    info!("🧹 Reconciliación:");
    info!("   POST /api/sweeps/stale-assignments - Expirar asignaciones vencidas");
    info!("   POST /api/sweeps/fleet-state - Refrescar estado de flota");
    info!("   POST /api/numbering/vale - Reservar número de vale");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| {
            error!("❌ Error del servidor: {}", e);
            e
        })?;

    info!("👋 Servidor terminado");
    Ok(())
}

/// Registro de eventos de dominio (historial)
async fn log_domain_events(mut receiver: broadcast::Receiver<DomainEvent>) {
    loop {
        match receiver.recv().await {
            Ok(event) => match serde_json::to_string(&event) {
                Ok(payload) => info!(event = event.name(), "📝 {}", payload),
                Err(e) => warn!("⚠️ Evento {} no serializable: {}", event.name(), e),
            },
            Err(RecvError::Lagged(skipped)) => {
                warn!("⚠️ Historial atrasado: {} eventos descartados", skipped)
            }
            Err(RecvError::Closed) => break,
        }
    }
}

async fn run_periodic_sweeps<S: FuelStore>(service: ReconciliationService<S>, period: Duration) {
    let caller = Caller::system();
    let mut ticker = tokio::time::interval(period);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = service.sweep_stale_assignments(&caller).await {
            error!("❌ Barrido de asignaciones vencidas falló: {}", e);
        }
        if let Err(e) = service.refresh_fleet_state(&caller).await {
            error!("❌ Refresco de flota falló: {}", e);
        }
    }
}

/// Señal de apagado graceful
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("❌ No se pudo instalar el handler de Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!("❌ No se pudo instalar el handler de SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("🛑 Señal Ctrl+C recibida, apagando servidor...");
        },
        _ = terminate => {
            info!("🛑 Señal de terminación recibida, apagando servidor...");
        },
    }
}
