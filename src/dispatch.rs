//! # Módulo de Políticas de Despacho
//!
//! Una política de despacho decide, para cada pasajero que llega, en qué fila
//! espera. El generador de llegadas es el único que la invoca, por eso
//! `select_line` recibe `&mut self` y cada política puede guardar su propio
//! estado (cursor, generador aleatorio) sin sincronización.
//!
//! Políticas disponibles:
//! - `Single`: una sola fila compartida por todas las estaciones
//! - `RoundRobin`: reparte las llegadas cíclicamente
//! - `ShortestQueue`: elige la fila con menos pasajeros
//! - `Random`: elige una fila al azar

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

use crate::context::SimulationContext;
use crate::error::{SimResult, SimulationError};
use crate::jitter::{self, DISPATCH_STREAM};

/// Selector de política, tal como lo entrega la línea de comandos.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PolicyKind {
    Single,
    RoundRobin,
    ShortestQueue,
    Random,
}

impl PolicyKind {
    /// Todas las políticas, en el orden del menú (1-4).
    pub const ALL: [PolicyKind; 4] = [
        PolicyKind::Single,
        PolicyKind::RoundRobin,
        PolicyKind::ShortestQueue,
        PolicyKind::Random,
    ];

    /// Nombre canónico del selector.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::RoundRobin => "round-robin",
            Self::ShortestQueue => "shortest-queue",
            Self::Random => "random",
        }
    }

    /// Número de filas que necesita la política para `stations` estaciones.
    ///
    /// ```rust
    /// use passenger_queue_simulator::PolicyKind;
    ///
    /// assert_eq!(PolicyKind::Single.lines_for(5), 1);
    /// assert_eq!(PolicyKind::RoundRobin.lines_for(5), 5);
    /// ```
    pub fn lines_for(&self, stations: usize) -> usize {
        match self {
            Self::Single => 1,
            Self::RoundRobin | Self::ShortestQueue | Self::Random => stations,
        }
    }

    /// Construye la política concreta.
    ///
    /// # Arguments
    ///
    /// * `num_lines` - Número de filas que repartirá la política
    /// * `seed` - Semilla de la corrida (solo la usa `Random`)
    /// * `measure` - Criterio de `ShortestQueue`
    ///
    /// # Errors
    ///
    /// `SimulationError::NoLines` si `num_lines < 1`.
    pub fn build(
        &self,
        num_lines: usize,
        seed: u64,
        measure: QueueMeasure,
    ) -> SimResult<Box<dyn DispatchPolicy>> {
        if num_lines < 1 {
            return Err(SimulationError::NoLines);
        }
        let policy: Box<dyn DispatchPolicy> = match self {
            Self::Single => Box::new(SingleLine),
            Self::RoundRobin => Box::new(RoundRobin::new(num_lines)?),
            Self::ShortestQueue => Box::new(ShortestQueue::new(num_lines, measure)?),
            Self::Random => {
                let rng = jitter::stream_rng(seed, DISPATCH_STREAM);
                Box::new(RandomLine::new(num_lines, rng)?)
            }
        };
        Ok(policy)
    }
}

impl fmt::Display for PolicyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PolicyKind {
    type Err = SimulationError;

    /// Acepta el nombre canónico, alias cortos y los números del menú (1-4).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "single" | "1" => Ok(Self::Single),
            "round-robin" | "roundrobin" | "rr" | "2" => Ok(Self::RoundRobin),
            "shortest-queue" | "shortest" | "sq" | "3" => Ok(Self::ShortestQueue),
            "random" | "4" => Ok(Self::Random),
            _ => Err(SimulationError::UnknownPolicy(s.to_string())),
        }
    }
}

/// Criterio con que `ShortestQueue` mide cada fila.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum QueueMeasure {
    /// Pasajeros esperando en este momento
    #[default]
    Current,
    /// Pasajeros asignados desde el inicio de la corrida
    Assigned,
}

impl FromStr for QueueMeasure {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "current" => Ok(Self::Current),
            "assigned" => Ok(Self::Assigned),
            other => Err(format!("criterio desconocido: '{other}' (use current o assigned)")),
        }
    }
}

/// Regla que elige la fila de cada llegada.
pub trait DispatchPolicy: Send {
    fn kind(&self) -> PolicyKind;

    /// Número de filas que la política espera encontrar en el contexto.
    fn line_count(&self) -> usize;

    /// Elige la fila para la llegada número `arrival_index`.
    fn select_line(&mut self, ctx: &SimulationContext, arrival_index: usize) -> SimResult<usize>;

    /// Verifica que el contexto tenga registradas exactamente las filas que
    /// la política reparte.
    fn ensure_registered(&self, ctx: &SimulationContext) -> SimResult<()> {
        if ctx.line_count() != self.line_count() {
            return Err(SimulationError::LinesNotRegistered {
                policy: self.kind().name(),
                expected: self.line_count(),
                registered: ctx.line_count(),
            });
        }
        Ok(())
    }
}

/// Todas las llegadas van a la fila 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct SingleLine;

impl DispatchPolicy for SingleLine {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Single
    }

    fn line_count(&self) -> usize {
        1
    }

    fn select_line(&mut self, ctx: &SimulationContext, _arrival_index: usize) -> SimResult<usize> {
        self.ensure_registered(ctx)?;
        Ok(0)
    }
}

/// Reparte las llegadas de forma cíclica: `arrival_index mod num_lines`.
#[derive(Debug, Clone, Copy)]
pub struct RoundRobin {
    num_lines: usize,
}

impl RoundRobin {
    pub fn new(num_lines: usize) -> SimResult<Self> {
        if num_lines < 1 {
            return Err(SimulationError::NoLines);
        }
        Ok(Self { num_lines })
    }
}

impl DispatchPolicy for RoundRobin {
    fn kind(&self) -> PolicyKind {
        PolicyKind::RoundRobin
    }

    fn line_count(&self) -> usize {
        self.num_lines
    }

    fn select_line(&mut self, ctx: &SimulationContext, arrival_index: usize) -> SimResult<usize> {
        self.ensure_registered(ctx)?;
        Ok(arrival_index % self.num_lines)
    }
}

/// Elige la fila con menos pasajeros; los empates van al índice menor.
///
/// Se recalcula en cada llegada porque la ocupación cambia a medida que las
/// estaciones atienden.
#[derive(Debug, Clone, Copy)]
pub struct ShortestQueue {
    num_lines: usize,
    measure: QueueMeasure,
}

impl ShortestQueue {
    pub fn new(num_lines: usize, measure: QueueMeasure) -> SimResult<Self> {
        if num_lines < 1 {
            return Err(SimulationError::NoLines);
        }
        Ok(Self { num_lines, measure })
    }
}

impl DispatchPolicy for ShortestQueue {
    fn kind(&self) -> PolicyKind {
        PolicyKind::ShortestQueue
    }

    fn line_count(&self) -> usize {
        self.num_lines
    }

    fn select_line(&mut self, ctx: &SimulationContext, _arrival_index: usize) -> SimResult<usize> {
        self.ensure_registered(ctx)?;
        let occupancy = |index: usize| match self.measure {
            QueueMeasure::Current => ctx.lines()[index].len(),
            QueueMeasure::Assigned => ctx.assigned_count(index),
        };
        // min_by_key conserva el primer mínimo: empate -> índice menor
        (0..self.num_lines)
            .min_by_key(|&index| occupancy(index))
            .ok_or(SimulationError::NoLines)
    }
}

/// Elige una fila uniforme en `[0, num_lines)` para cada llegada.
#[derive(Debug, Clone)]
pub struct RandomLine {
    num_lines: usize,
    rng: ChaCha8Rng,
}

impl RandomLine {
    pub fn new(num_lines: usize, rng: ChaCha8Rng) -> SimResult<Self> {
        if num_lines < 1 {
            return Err(SimulationError::NoLines);
        }
        Ok(Self { num_lines, rng })
    }
}

impl DispatchPolicy for RandomLine {
    fn kind(&self) -> PolicyKind {
        PolicyKind::Random
    }

    fn line_count(&self) -> usize {
        self.num_lines
    }

    fn select_line(&mut self, ctx: &SimulationContext, _arrival_index: usize) -> SimResult<usize> {
        self.ensure_registered(ctx)?;
        Ok(self.rng.gen_range(0..self.num_lines))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::passenger::Passenger;
    use std::time::Duration;

    fn context_with_lines(passengers: usize, lines: usize) -> SimulationContext {
        let passengers = (0..passengers).map(|i| Passenger::new(i, Duration::ZERO)).collect();
        let mut ctx = SimulationContext::new(passengers, lines, Duration::from_secs(1));
        for _ in 0..lines {
            ctx.register_line();
        }
        ctx
    }

    /// Despacha un pasajero como lo hace el generador, sin estaciones consumiendo.
    fn dispatch(policy: &mut dyn DispatchPolicy, ctx: &SimulationContext, index: usize) -> usize {
        let line = policy.select_line(ctx, index).unwrap();
        ctx.record_assignment(line).unwrap();
        let passenger = ctx.passengers()[index].clone();
        passenger.assign_line(line).unwrap();
        ctx.lines()[line].push(passenger).unwrap();
        line
    }

    #[test]
    fn test_parse_selectors() {
        assert_eq!("single".parse::<PolicyKind>().unwrap(), PolicyKind::Single);
        assert_eq!("Round-Robin".parse::<PolicyKind>().unwrap(), PolicyKind::RoundRobin);
        assert_eq!("round_robin".parse::<PolicyKind>().unwrap(), PolicyKind::RoundRobin);
        assert_eq!("3".parse::<PolicyKind>().unwrap(), PolicyKind::ShortestQueue);
        assert_eq!("random".parse::<PolicyKind>().unwrap(), PolicyKind::Random);

        let err = "lifo".parse::<PolicyKind>().unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_display_round_trips_through_parse() {
        for kind in PolicyKind::ALL {
            assert_eq!(kind.to_string().parse::<PolicyKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_build_rejects_zero_lines() {
        for kind in PolicyKind::ALL {
            assert!(matches!(
                kind.build(0, 1, QueueMeasure::Current),
                Err(SimulationError::NoLines)
            ));
        }
    }

    #[test]
    fn test_single_always_line_zero() {
        let ctx = context_with_lines(6, 1);
        let mut policy = PolicyKind::Single.build(1, 0, QueueMeasure::Current).unwrap();
        let assigned: Vec<usize> = (0..6).map(|i| dispatch(policy.as_mut(), &ctx, i)).collect();
        assert_eq!(assigned, vec![0; 6]);
    }

    #[test]
    fn test_round_robin_sequence() {
        let ctx = context_with_lines(12, 5);
        let mut policy = PolicyKind::RoundRobin.build(5, 0, QueueMeasure::Current).unwrap();
        let assigned: Vec<usize> = (0..12).map(|i| dispatch(policy.as_mut(), &ctx, i)).collect();
        assert_eq!(assigned, vec![0, 1, 2, 3, 4, 0, 1, 2, 3, 4, 0, 1]);
    }

    #[test]
    fn test_shortest_queue_spreads_then_follows_drained_line() {
        let ctx = context_with_lines(8, 3);
        let mut policy = PolicyKind::ShortestQueue.build(3, 0, QueueMeasure::Current).unwrap();

        let first_three: Vec<usize> = (0..3).map(|i| dispatch(policy.as_mut(), &ctx, i)).collect();
        assert_eq!(first_three, vec![0, 1, 2]);

        // La fila 1 se vacía; la cuarta llegada debe ir ahí
        assert!(ctx.lines()[1].pop().is_some());
        assert_eq!(dispatch(policy.as_mut(), &ctx, 3), 1);

        // Todas con un pasajero: empate, gana el índice menor
        assert_eq!(dispatch(policy.as_mut(), &ctx, 4), 0);
    }

    #[test]
    fn test_shortest_queue_by_assigned_count_ignores_draining() {
        let ctx = context_with_lines(8, 3);
        let mut policy = PolicyKind::ShortestQueue.build(3, 0, QueueMeasure::Assigned).unwrap();

        for i in 0..3 {
            dispatch(policy.as_mut(), &ctx, i);
        }
        assert!(ctx.lines()[1].pop().is_some());

        // Con el criterio histórico la fila 1 sigue contando su asignación
        assert_eq!(dispatch(policy.as_mut(), &ctx, 3), 0);
        assert_eq!(dispatch(policy.as_mut(), &ctx, 4), 1);
    }

    #[test]
    fn test_random_is_in_range_and_reproducible() {
        let ctx = context_with_lines(200, 4);
        let draw = |seed: u64| -> Vec<usize> {
            let mut policy = PolicyKind::Random.build(4, seed, QueueMeasure::Current).unwrap();
            (0..200).map(|i| policy.select_line(&ctx, i).unwrap()).collect()
        };

        let first = draw(99);
        assert!(first.iter().all(|&line| line < 4));
        assert_eq!(first, draw(99));
        // Con 200 llegadas todas las filas reciben alguna
        for line in 0..4 {
            assert!(first.contains(&line));
        }
    }

    #[test]
    fn test_policies_require_registered_lines() {
        let ctx = context_with_lines(4, 2);
        for kind in [PolicyKind::RoundRobin, PolicyKind::ShortestQueue, PolicyKind::Random] {
            let mut policy = kind.build(5, 0, QueueMeasure::Current).unwrap();
            assert!(matches!(
                policy.select_line(&ctx, 0),
                Err(SimulationError::LinesNotRegistered { expected: 5, registered: 2, .. })
            ));
        }

        let mut single = PolicyKind::Single.build(1, 0, QueueMeasure::Current).unwrap();
        assert!(single.select_line(&ctx, 0).is_err());
    }
}
