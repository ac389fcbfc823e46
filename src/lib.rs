//! # Simulador de Filas de Pasajeros
//!
//! Esta biblioteca simula pasajeros que llegan a un punto de servicio con varias
//! estaciones y compara cuatro políticas para repartirlos en filas: una fila
//! única, Round Robin, la fila más corta y asignación aleatoria.
//!
//! ## Características principales
//!
//! - **Concurrencia real**: un hilo por estación más uno para el generador de
//!   llegadas, coordinados con filas bloqueantes (`Mutex` + `Condvar`).
//! - **Terminación explícita**: el generador cierra las filas al terminar y cada
//!   estación sale cuando su fila está cerrada y vacía.
//! - **Tiempo virtual**: todos los tiempos son segundos simulados detrás del
//!   trait [`Clock`]; la escala a tiempo real es configurable.
//! - **Métricas**: espera promedio y máxima por fila, longitud máxima observada
//!   y utilización por estación.
//!
//! ## Estructura del proyecto
//!
//! - `passenger`: pasajeros y sus marcas de tiempo de una sola escritura
//! - `line`: fila FIFO acotada y cerrable
//! - `context`: estado compartido de una corrida
//! - `dispatch`: políticas de despacho
//! - `generator`: plan de llegadas y ciclo de despacho
//! - `station`: estaciones de servicio
//! - `simulation`: conductor de la corrida
//! - `metrics`: cálculo y reporte de estadísticas

pub mod clock;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod generator;
pub mod jitter;
pub mod line;
pub mod logging;
pub mod metrics;
pub mod passenger;
pub mod simulation;
pub mod station;

// Re-exportar las estructuras principales para facilitar su uso
pub use clock::{ActivityGuard, Clock, EventClock, ScaledClock};
pub use context::SimulationContext;
pub use dispatch::{DispatchPolicy, PolicyKind, QueueMeasure};
pub use error::{SimResult, SimulationError};
pub use jitter::JitterRange;
pub use line::Line;
pub use metrics::{LineStatistics, MetricsCalculator, StationStatistics, StatisticsSnapshot};
pub use passenger::{Passenger, PassengerRecord};
pub use simulation::{run_simulation, RunPhase, Simulation, SimulationConfig};
pub use station::{Station, StationConfig};

/// Configuración por defecto del simulador
pub mod config {
    use std::time::Duration;

    /// Número de estaciones de servicio
    pub const DEFAULT_STATION_COUNT: usize = 5;

    /// Cota del jitter, en segundos simulados
    pub const DEFAULT_JITTER_SECS: u64 = 2;

    /// Tiempo real que dura un segundo simulado
    pub const DEFAULT_TIME_SCALE: Duration = Duration::from_secs(1);
}
