//! Configuración de trazas para el simulador.
//!
//! La salida va a stderr para que el reporte (o el JSON) quede limpio en
//! stdout.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

/// Inicializa el suscriptor global de `tracing`.
///
/// `RUST_LOG` tiene prioridad; si no está definida se usa `level`.
///
/// # Errors
///
/// Falla si ya había un suscriptor global instalado.
pub fn init_tracing(level: Level) -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .with_filter(filter);

    tracing_subscriber::registry().with(console_layer).try_init()?;
    Ok(())
}
