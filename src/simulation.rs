//! # Módulo de Simulación Principal
//!
//! Este módulo contiene el conductor de la simulación: valida la
//! configuración, construye filas, estaciones y política, lanza un hilo por
//! estación más uno para el generador, espera la terminación conjunta y
//! calcula las estadísticas.
//!
//! Ciclo de vida de una corrida:
//! `Configuring → Running → Draining → Reported`.

use std::fmt;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info};

use crate::clock::{ActivityGuard, Clock, ScaledClock};
use crate::config;
use crate::context::SimulationContext;
use crate::dispatch::{DispatchPolicy, PolicyKind, QueueMeasure};
use crate::error::{SimResult, SimulationError};
use crate::generator::{self, ArrivalGenerator};
use crate::jitter::{self, JitterRange, GENERATOR_STREAM, STATION_STREAM_BASE};
use crate::metrics::{MetricsCalculator, StatisticsSnapshot};
use crate::station::{Station, StationConfig, StationSummary};

/// Parámetros validados de una corrida.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulationConfig {
    pub policy: PolicyKind,
    pub duration: Duration,
    pub average_arrival: Duration,
    pub average_service: Duration,
    pub stations: usize,
    pub jitter: JitterRange,
    pub seed: Option<u64>,
    pub queue_measure: QueueMeasure,
}

impl SimulationConfig {
    /// Valida los tres valores escalares de entrada (en segundos) y crea una
    /// configuración con los valores por defecto para el resto.
    ///
    /// # Errors
    ///
    /// - `InvalidDuration` si `duration_secs < 0`
    /// - `InvalidArrivalInterval` si `average_arrival_secs <= 0`
    /// - `InvalidServiceTime` si `average_service_secs < 0`
    ///
    /// # Examples
    ///
    /// ```rust
    /// use passenger_queue_simulator::{PolicyKind, SimulationConfig};
    ///
    /// let config = SimulationConfig::new(PolicyKind::RoundRobin, 120, 7, 20).unwrap();
    /// assert_eq!(config.passenger_count(), 17);
    ///
    /// assert!(SimulationConfig::new(PolicyKind::Single, 120, 0, 20).is_err());
    /// ```
    pub fn new(
        policy: PolicyKind,
        duration_secs: i64,
        average_arrival_secs: i64,
        average_service_secs: i64,
    ) -> SimResult<Self> {
        if duration_secs < 0 {
            return Err(SimulationError::InvalidDuration(duration_secs));
        }
        if average_arrival_secs <= 0 {
            return Err(SimulationError::InvalidArrivalInterval(average_arrival_secs));
        }
        if average_service_secs < 0 {
            return Err(SimulationError::InvalidServiceTime(average_service_secs));
        }

        Ok(Self {
            policy,
            duration: Duration::from_secs(duration_secs.unsigned_abs()),
            average_arrival: Duration::from_secs(average_arrival_secs.unsigned_abs()),
            average_service: Duration::from_secs(average_service_secs.unsigned_abs()),
            stations: config::DEFAULT_STATION_COUNT,
            jitter: JitterRange::new(config::DEFAULT_JITTER_SECS),
            seed: None,
            queue_measure: QueueMeasure::default(),
        })
    }

    pub fn with_stations(mut self, stations: usize) -> Self {
        self.stations = stations;
        self
    }

    pub fn with_jitter(mut self, jitter: JitterRange) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_queue_measure(mut self, measure: QueueMeasure) -> Self {
        self.queue_measure = measure;
        self
    }

    /// Número de pasajeros de la corrida: `duration / average_arrival`,
    /// con división entera.
    pub fn passenger_count(&self) -> usize {
        let arrival = self.average_arrival.as_secs().max(1);
        usize::try_from(self.duration.as_secs() / arrival).unwrap_or(usize::MAX)
    }

    /// Número de filas que usa la política configurada.
    pub fn line_count(&self) -> usize {
        self.policy.lines_for(self.stations)
    }

    fn validate(&self) -> SimResult<()> {
        if self.stations == 0 {
            return Err(SimulationError::NoStations);
        }
        if self.average_arrival.is_zero() {
            return Err(SimulationError::InvalidArrivalInterval(0));
        }
        Ok(())
    }
}

/// Fase de una corrida.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Configuring,
    Running,
    Draining,
    Reported,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Configuring => "configurando",
            Self::Running => "ejecutando",
            Self::Draining => "vaciando",
            Self::Reported => "reportada",
        };
        f.write_str(name)
    }
}

/// Orquestador de una corrida de simulación.
///
/// Se construye en la fase `Configuring` y se ejecuta una sola vez con
/// [`Simulation::run`]. Después de reportar, el contexto queda en solo
/// lectura y [`Simulation::statistics`] puede volver a calcular el mismo
/// resultado.
pub struct Simulation {
    config: SimulationConfig,
    seed: u64,
    ctx: Arc<SimulationContext>,
    clock: Arc<dyn Clock>,
    policy: Option<Box<dyn DispatchPolicy>>,
    phase: RunPhase,
    started: Duration,
    elapsed: Option<Duration>,
    metrics_calculator: MetricsCalculator,
}

impl Simulation {
    /// Crea una simulación en tiempo real (un segundo simulado por segundo).
    pub fn new(config: SimulationConfig) -> SimResult<Self> {
        Self::with_clock(config, Arc::new(ScaledClock::new(config::DEFAULT_TIME_SCALE)))
    }

    /// Crea una simulación con un reloj dado.
    ///
    /// Valida la configuración y construye el contexto, las filas y la
    /// política. Ningún hilo se lanza todavía.
    ///
    /// # Errors
    ///
    /// Errores de configuración: sin estaciones, intervalo de llegada nulo.
    pub fn with_clock(config: SimulationConfig, clock: Arc<dyn Clock>) -> SimResult<Self> {
        config.validate()?;

        let seed = config.seed.unwrap_or_else(rand::random);
        let mut rng = jitter::stream_rng(seed, GENERATOR_STREAM);
        let plan = generator::plan_arrivals(
            config.passenger_count(),
            config.average_arrival,
            config.jitter,
            &mut rng,
        );

        let mut ctx = SimulationContext::new(
            generator::create_passengers(&plan),
            config.stations,
            config.average_service,
        );
        for _ in 0..config.line_count() {
            ctx.register_clocked_line(&clock);
        }

        let policy = config.policy.build(config.line_count(), seed, config.queue_measure)?;

        info!(
            target: "simulacion",
            policy = %config.policy,
            passengers = ctx.passenger_count(),
            stations = config.stations,
            lines = ctx.line_count(),
            seed,
            "simulación configurada"
        );

        Ok(Self {
            config,
            seed,
            ctx: Arc::new(ctx),
            clock,
            policy: Some(policy),
            phase: RunPhase::Configuring,
            started: Duration::ZERO,
            elapsed: None,
            metrics_calculator: MetricsCalculator::new(),
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Semilla efectiva de la corrida.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn phase(&self) -> RunPhase {
        self.phase
    }

    /// Contexto de la corrida; en solo lectura una vez reportada.
    pub fn context(&self) -> &Arc<SimulationContext> {
        &self.ctx
    }

    /// Ejecuta la corrida completa y retorna las estadísticas.
    ///
    /// 1. Lanza un hilo por estación y el hilo del generador (`Running`)
    /// 2. Espera a que el generador despache a todos (`Draining`)
    /// 3. Espera a que cada estación vacíe su fila y termine
    /// 4. Verifica que todos los pasajeros fueron atendidos (`Reported`)
    ///
    /// La duración reportada se mide en tiempo virtual desde el inicio de
    /// `run`.
    ///
    /// # Errors
    ///
    /// Cualquier falla interna aborta la corrida sin producir un reporte
    /// parcial. Llamarla dos veces devuelve `AlreadyRun`.
    pub fn run(&mut self) -> SimResult<StatisticsSnapshot> {
        let policy = match (self.phase, self.policy.take()) {
            (RunPhase::Configuring, Some(policy)) => policy,
            _ => return Err(SimulationError::AlreadyRun),
        };
        self.started = self.clock.now();

        let stations = self.launch_stations()?;
        let generator = match self.launch_generator(policy) {
            Ok(handle) => handle,
            Err(err) => {
                // Sin generador nadie cerrará las filas
                self.ctx.close_lines();
                let _ = Self::join_stations(stations);
                return Err(err);
            }
        };
        self.enter(RunPhase::Running);

        let generated = join_activity(generator, "generador");
        self.enter(RunPhase::Draining);
        let drained = Self::join_stations(stations);

        let dispatched = generated?;
        let summaries = drained?;

        let served = self.ctx.passengers_served();
        let expected = self.ctx.passenger_count();
        if dispatched != expected || served != expected {
            error!(target: "simulacion", dispatched, served, expected, "corrida incompleta");
            return Err(SimulationError::IncompleteRun { served, expected });
        }

        let elapsed = self.clock.now().saturating_sub(self.started);
        self.elapsed = Some(elapsed);
        self.enter(RunPhase::Reported);

        info!(
            target: "simulacion",
            elapsed_secs = elapsed.as_secs_f64(),
            served,
            busiest = summaries.iter().map(|s| s.served).max().unwrap_or(0),
            "simulación completada"
        );

        self.statistics()
    }

    /// Calcula las estadísticas de una corrida ya reportada.
    ///
    /// # Errors
    ///
    /// `NotReported` si la corrida aún no terminó.
    pub fn statistics(&self) -> SimResult<StatisticsSnapshot> {
        match (self.phase, self.elapsed) {
            (RunPhase::Reported, Some(elapsed)) => {
                Ok(self.metrics_calculator.calculate(&self.ctx, elapsed, self.config.policy))
            }
            _ => Err(SimulationError::NotReported),
        }
    }

    /// Genera el reporte de texto de la corrida.
    pub fn generate_report(&self, snapshot: &StatisticsSnapshot) -> String {
        self.metrics_calculator.generate_report(snapshot)
    }

    /// Genera el CSV por pasajero de la corrida.
    pub fn generate_csv_report(&self) -> String {
        self.metrics_calculator.generate_csv_report(&self.ctx)
    }

    fn enter(&mut self, phase: RunPhase) {
        info!(target: "simulacion", from = %self.phase, to = %phase, "cambio de fase");
        self.phase = phase;
    }

    /// Lanza todos los hilos de las estaciones.
    ///
    /// Con una sola fila todas las estaciones la comparten; con varias, la
    /// estación `i` atiende la fila `i`.
    fn launch_stations(&self) -> SimResult<Vec<JoinHandle<SimResult<StationSummary>>>> {
        let mut handles = Vec::with_capacity(self.config.stations);

        for index in 0..self.config.stations {
            let line = Arc::clone(self.ctx.line(index % self.ctx.line_count())?);
            let station = Station::new(
                StationConfig {
                    index,
                    average_service: self.config.average_service,
                    jitter: self.config.jitter,
                },
                line,
                Arc::clone(&self.ctx),
                Arc::clone(&self.clock),
                jitter::stream_rng(self.seed, STATION_STREAM_BASE + index as u64),
            );

            debug!(
                target: "simulacion",
                station = station.index(),
                line = station.line_id(),
                "lanzando estación"
            );

            // El registro viaja con el hilo; si el hilo no llega a lanzarse,
            // se suelta junto con el closure
            let activity = ActivityGuard::register(Arc::clone(&self.clock));
            let spawned = thread::Builder::new()
                .name(format!("estacion-{index}"))
                .spawn(move || {
                    let _activity = activity;
                    station.run()
                });

            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    self.ctx.close_lines();
                    let _ = Self::join_stations(handles);
                    return Err(SimulationError::Spawn(err));
                }
            }
        }

        Ok(handles)
    }

    /// Lanza el generador de llegadas.
    ///
    /// Se registra en el reloj después de todas las estaciones: ninguna
    /// llegada ocurre antes de que cada estación pueda esperar su fila.
    fn launch_generator(
        &self,
        policy: Box<dyn DispatchPolicy>,
    ) -> SimResult<JoinHandle<SimResult<usize>>> {
        let generator =
            ArrivalGenerator::new(Arc::clone(&self.ctx), policy, Arc::clone(&self.clock));
        let activity = ActivityGuard::register(Arc::clone(&self.clock));
        let handle = thread::Builder::new()
            .name("generador".to_string())
            .spawn(move || {
                let _activity = activity;
                generator.run()
            })?;
        Ok(handle)
    }

    /// Espera a todas las estaciones, aun si alguna falló, y devuelve el
    /// primer error encontrado.
    fn join_stations(
        handles: Vec<JoinHandle<SimResult<StationSummary>>>,
    ) -> SimResult<Vec<StationSummary>> {
        let mut summaries = Vec::with_capacity(handles.len());
        let mut first_error = None;

        for (index, handle) in handles.into_iter().enumerate() {
            match join_activity(handle, &format!("estacion-{index}")) {
                Ok(summary) => summaries.push(summary),
                Err(err) => {
                    error!(
                        target: "simulacion",
                        station = index,
                        error = %err,
                        "estación fallida"
                    );
                    first_error.get_or_insert(err);
                }
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(summaries),
        }
    }
}

/// Espera a un hilo y convierte un pánico en `ActivityPanicked`.
fn join_activity<T>(handle: JoinHandle<SimResult<T>>, name: &str) -> SimResult<T> {
    handle
        .join()
        .map_err(|_| SimulationError::ActivityPanicked(name.to_string()))?
}

/// Configura y ejecuta una corrida con el reloj dado.
pub fn run_simulation(
    config: SimulationConfig,
    clock: Arc<dyn Clock>,
) -> SimResult<StatisticsSnapshot> {
    Simulation::with_clock(config, clock)?.run()
}
