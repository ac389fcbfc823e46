//! # Módulo del Generador de Llegadas
//!
//! Planifica las llegadas de los pasajeros en tiempo virtual y, durante la
//! corrida, las entrega a la política de despacho respetando esos tiempos.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::context::SimulationContext;
use crate::dispatch::DispatchPolicy;
use crate::error::SimResult;
use crate::jitter::{self, JitterRange};
use crate::passenger::Passenger;

/// Calcula los tiempos de llegada de `count` pasajeros.
///
/// El pasajero `i` llega en `i * interval + jitter`. El resultado nunca es
/// negativo y nunca decrece: un jitter que adelantaría a un pasajero por
/// delante del anterior se recorta al tiempo del anterior.
///
/// # Examples
///
/// ```rust
/// use std::time::Duration;
/// use passenger_queue_simulator::generator::plan_arrivals;
/// use passenger_queue_simulator::jitter::{stream_rng, JitterRange};
///
/// let mut rng = stream_rng(1, 0);
/// let plan = plan_arrivals(3, Duration::from_secs(10), JitterRange::none(), &mut rng);
/// assert_eq!(plan, vec![Duration::ZERO, Duration::from_secs(10), Duration::from_secs(20)]);
/// ```
pub fn plan_arrivals<R: Rng + ?Sized>(
    count: usize,
    interval: Duration,
    jitter: JitterRange,
    rng: &mut R,
) -> Vec<Duration> {
    let mut previous = Duration::ZERO;
    (0..count)
        .map(|index| {
            let base = interval.saturating_mul(u32::try_from(index).unwrap_or(u32::MAX));
            let scheduled = jitter::offset_by(base, jitter.sample(rng)).max(previous);
            previous = scheduled;
            scheduled
        })
        .collect()
}

/// Crea el arreglo de pasajeros a partir de un plan de llegadas.
pub fn create_passengers(plan: &[Duration]) -> Vec<Arc<Passenger>> {
    plan.iter()
        .enumerate()
        .map(|(id, &scheduled)| Passenger::new(id, scheduled))
        .collect()
}

/// Actividad que introduce a los pasajeros en sus filas.
pub struct ArrivalGenerator {
    ctx: Arc<SimulationContext>,
    policy: Box<dyn DispatchPolicy>,
    clock: Arc<dyn Clock>,
}

impl ArrivalGenerator {
    pub fn new(
        ctx: Arc<SimulationContext>,
        policy: Box<dyn DispatchPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self { ctx, policy, clock }
    }

    /// Ejecuta el ciclo de generación completo y devuelve cuántos pasajeros
    /// fueron despachados.
    ///
    /// Al terminar, con éxito o con error, cierra todas las filas: esa es la
    /// señal de que no habrá más llegadas.
    pub fn run(mut self) -> SimResult<usize> {
        let result = self.dispatch_all();
        self.ctx.close_lines();
        match &result {
            Ok(dispatched) => info!(
                target: "generador",
                dispatched,
                "generación completada, filas cerradas"
            ),
            Err(err) => warn!(
                target: "generador",
                error = %err,
                "generación abortada, filas cerradas"
            ),
        }
        result
    }

    fn dispatch_all(&mut self) -> SimResult<usize> {
        let ctx = Arc::clone(&self.ctx);
        info!(
            target: "generador",
            passengers = ctx.passenger_count(),
            policy = %self.policy.kind(),
            "iniciando generación de llegadas"
        );

        for (index, passenger) in ctx.passengers().iter().enumerate() {
            self.clock.sleep_until(passenger.scheduled_arrival);
            self.dispatch(index, passenger)?;
        }
        Ok(ctx.passenger_count())
    }

    /// Despacha un pasajero: elige fila, sella su llegada y lo encola.
    ///
    /// La llegada se sella antes de encolar para que ninguna estación pueda
    /// sacarlo de la fila sin tiempo de llegada registrado.
    pub fn dispatch(&mut self, index: usize, passenger: &Arc<Passenger>) -> SimResult<usize> {
        let line_index = self.policy.select_line(&self.ctx, index)?;
        let line = self.ctx.line(line_index)?;

        passenger.assign_line(line_index)?;
        self.ctx.record_assignment(line_index)?;

        let now = self.clock.now();
        passenger.stamp_arrival(now)?;
        let length = line.push(Arc::clone(passenger))?;
        self.ctx.observe_line_length(line_index, length)?;

        debug!(
            target: "generador",
            passenger = passenger.id,
            line = line_index,
            length,
            at_secs = now.as_secs_f64(),
            "pasajero encolado"
        );
        Ok(line_index)
    }
}
