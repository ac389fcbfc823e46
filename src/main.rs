use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, Level};

use passenger_queue_simulator::logging::init_tracing;
use passenger_queue_simulator::{
    config, Clock, EventClock, JitterRange, PolicyKind, QueueMeasure, ScaledClock, Simulation,
    SimulationConfig, SimulationError,
};

/// Escala máxima aceptada: un minuto real por segundo simulado.
const MAX_TIME_SCALE_MS: u64 = 60_000;

/// Simulador de filas de pasajeros con varias políticas de despacho.
#[derive(Parser, Debug)]
#[command(name = "passenger-queue-simulator")]
#[command(about = "Simula pasajeros atendidos por varias estaciones de servicio")]
#[command(allow_negative_numbers = true)]
struct Cli {
    /// Política: single, round-robin, shortest-queue, random (o 1-4)
    #[arg(short, long)]
    policy: PolicyKind,

    /// Duración de la simulación en minutos
    #[arg(short, long, conflicts_with = "duration", required_unless_present = "duration")]
    minutes: Option<i64>,

    /// Duración de la simulación en segundos
    #[arg(short, long)]
    duration: Option<i64>,

    /// Tiempo promedio entre llegadas, en segundos
    #[arg(short, long)]
    arrival: i64,

    /// Tiempo promedio de servicio, en segundos
    #[arg(short = 'S', long)]
    service: i64,

    /// Número de estaciones de servicio
    #[arg(short, long, default_value_t = config::DEFAULT_STATION_COUNT)]
    stations: usize,

    /// Cota del jitter en segundos; 0 lo desactiva
    #[arg(short, long, default_value_t = config::DEFAULT_JITTER_SECS)]
    jitter: u64,

    /// Semilla para reproducir una corrida
    #[arg(long)]
    seed: Option<u64>,

    /// Milisegundos reales por segundo simulado; 0 corre por eventos
    /// discretos, sin esperas reales
    #[arg(
        long,
        default_value_t = config::DEFAULT_TIME_SCALE.as_millis() as u64,
        value_parser = clap::value_parser!(u64).range(0..=MAX_TIME_SCALE_MS),
    )]
    time_scale_ms: u64,

    /// Criterio de shortest-queue: current o assigned
    #[arg(long, default_value = "current")]
    measure: QueueMeasure,

    /// Imprime las estadísticas en JSON en lugar del reporte de texto
    #[arg(long)]
    json: bool,

    /// Escribe el detalle por pasajero en un archivo CSV
    #[arg(long)]
    csv: Option<PathBuf>,

    /// Nivel de log en consola (RUST_LOG tiene prioridad)
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Cli {
    /// Duración en segundos, a partir de `--minutes` o `--duration`.
    fn duration_secs(&self) -> Result<i64, SimulationError> {
        match (self.minutes, self.duration) {
            (Some(minutes), _) => minutes
                .checked_mul(60)
                .ok_or(SimulationError::InvalidDuration(minutes)),
            (None, Some(secs)) => Ok(secs),
            (None, None) => Err(SimulationError::InvalidDuration(0)),
        }
    }

    fn simulation_config(&self) -> Result<SimulationConfig, SimulationError> {
        let mut config =
            SimulationConfig::new(self.policy, self.duration_secs()?, self.arrival, self.service)?
                .with_stations(self.stations)
                .with_jitter(JitterRange::new(self.jitter))
                .with_queue_measure(self.measure);
        if let Some(seed) = self.seed {
            config = config.with_seed(seed);
        }
        Ok(config)
    }

    /// Reloj de la corrida según `--time-scale-ms`.
    fn clock(&self) -> Arc<dyn Clock> {
        if self.time_scale_ms == 0 {
            info!("tiempo por eventos discretos");
            return Arc::new(EventClock::new());
        }
        let clock = ScaledClock::new(Duration::from_millis(self.time_scale_ms));
        info!(scale_ms = clock.scale().as_millis() as u64, "tiempo escalado");
        Arc::new(clock)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.log_level)?;

    let config = cli.simulation_config()?;
    let clock = cli.clock();

    info!(
        policy = %config.policy,
        passengers = config.passenger_count(),
        stations = config.stations,
        "preparando simulación"
    );

    let mut simulation = Simulation::with_clock(config, clock)?;
    let snapshot = simulation.run()?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
    } else {
        println!("{}", simulation.generate_report(&snapshot));
    }

    if let Some(path) = &cli.csv {
        fs::write(path, simulation.generate_csv_report())?;
        info!(path = %path.display(), "detalle por pasajero guardado");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minutes_are_converted_to_seconds() {
        let cli = Cli::parse_from([
            "sim", "--policy", "rr", "--minutes", "2", "--arrival", "7", "--service", "20",
        ]);
        assert_eq!(cli.duration_secs().unwrap(), 120);
        let config = cli.simulation_config().unwrap();
        assert_eq!(config.policy, PolicyKind::RoundRobin);
        assert_eq!(config.passenger_count(), 17);
        assert_eq!(config.stations, config::DEFAULT_STATION_COUNT);
    }

    #[test]
    fn test_menu_numbers_select_policy() {
        let cli = Cli::parse_from([
            "sim", "-p", "3", "-d", "60", "-a", "5", "-S", "1", "--measure", "assigned",
        ]);
        assert_eq!(cli.policy, PolicyKind::ShortestQueue);
        assert_eq!(cli.measure, QueueMeasure::Assigned);
        assert_eq!(cli.duration_secs().unwrap(), 60);
    }

    #[test]
    fn test_invalid_inputs_are_rejected() {
        assert!(
            Cli::try_parse_from(["sim", "-p", "fifo", "-d", "60", "-a", "5", "-S", "1"]).is_err()
        );
        assert!(
            Cli::try_parse_from(["sim", "-p", "1", "-m", "1", "-d", "60", "-a", "5", "-S", "1"])
                .is_err()
        );

        let cli = Cli::parse_from(["sim", "-p", "1", "-d", "60", "-a", "0", "-S", "1"]);
        assert!(matches!(
            cli.simulation_config(),
            Err(SimulationError::InvalidArrivalInterval(0))
        ));

        let cli = Cli::parse_from(["sim", "-p", "1", "-d", "-5", "-a", "1", "-S", "1"]);
        assert!(matches!(cli.simulation_config(), Err(SimulationError::InvalidDuration(-5))));
    }

    #[test]
    fn test_time_scale_is_bounded() {
        let args = |scale: &'static str| {
            ["sim", "-p", "2", "-d", "10", "-a", "1", "-S", "1", "--time-scale-ms", scale]
        };
        assert!(Cli::try_parse_from(args("60001")).is_err());
        assert!(Cli::try_parse_from(args("18446744073709551615")).is_err());
        assert_eq!(Cli::parse_from(args("60000")).time_scale_ms, MAX_TIME_SCALE_MS);
    }

    #[test]
    fn test_zero_time_scale_runs_on_event_clock() {
        let cli = Cli::parse_from([
            "sim", "-p", "2", "-d", "10", "-a", "1", "-S", "3", "--time-scale-ms", "0",
        ]);
        let mut simulation =
            Simulation::with_clock(cli.simulation_config().unwrap(), cli.clock()).unwrap();
        let snapshot = simulation.run().unwrap();
        assert_eq!(snapshot.passengers_served, 10);
    }
}
