//! # Módulo de Estaciones de Servicio
//!
//! Cada estación se ejecuta en su propio hilo, atada a una fila durante toda
//! la corrida. Toma pasajeros de la fila en orden FIFO, simula el servicio
//! suspendiéndose en el reloj virtual y registra el resultado en el contexto.

use std::sync::Arc;
use std::time::Duration;

use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::clock::Clock;
use crate::context::SimulationContext;
use crate::error::SimResult;
use crate::jitter::{self, JitterRange};
use crate::line::Line;
use crate::passenger::Passenger;

/// Configuración estática de una estación.
#[derive(Clone, Copy, Debug)]
pub struct StationConfig {
    /// Índice único de la estación
    pub index: usize,
    /// Tiempo promedio de servicio
    pub average_service: Duration,
    /// Jitter aplicado a cada servicio
    pub jitter: JitterRange,
}

/// Resumen de lo que hizo una estación durante la corrida.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StationSummary {
    pub index: usize,
    pub served: usize,
    pub busy_time: Duration,
}

/// Estación de servicio atada a una fila.
pub struct Station {
    config: StationConfig,
    line: Arc<Line>,
    ctx: Arc<SimulationContext>,
    clock: Arc<dyn Clock>,
    rng: ChaCha8Rng,
}

impl Station {
    /// Crea una estación.
    ///
    /// # Arguments
    ///
    /// * `config` - Índice, tiempo promedio de servicio y jitter
    /// * `line` - Fila de la que atenderá; no cambia durante la corrida
    /// * `ctx` - Contexto compartido de la corrida
    /// * `clock` - Reloj virtual para simular el servicio
    /// * `rng` - Generador propio de la estación
    pub fn new(
        config: StationConfig,
        line: Arc<Line>,
        ctx: Arc<SimulationContext>,
        clock: Arc<dyn Clock>,
        rng: ChaCha8Rng,
    ) -> Self {
        Self {
            config,
            line,
            ctx,
            clock,
            rng,
        }
    }

    pub fn index(&self) -> usize {
        self.config.index
    }

    pub fn line_id(&self) -> usize {
        self.line.id()
    }

    /// Ejecuta el bucle principal de la estación.
    ///
    /// Termina cuando la fila está cerrada y vacía; mientras queden
    /// pasajeros en la fila los sigue atendiendo aunque el generador ya haya
    /// terminado.
    ///
    /// # Errors
    ///
    /// Propaga cualquier falla interna al sellar un pasajero o al registrar
    /// el servicio; el conductor de la simulación aborta la corrida.
    pub fn run(mut self) -> SimResult<StationSummary> {
        info!(
            target: "estacion",
            station = self.config.index,
            line = self.line.id(),
            "estación iniciada"
        );

        let mut served = 0;
        let mut busy_time = Duration::ZERO;
        while let Some(passenger) = self.line.pop() {
            busy_time += self.serve(&passenger)?;
            served += 1;
        }

        info!(
            target: "estacion",
            station = self.config.index,
            served,
            busy_secs = busy_time.as_secs_f64(),
            "fila cerrada y vacía, estación finalizando"
        );

        Ok(StationSummary {
            index: self.config.index,
            served,
            busy_time,
        })
    }

    /// Atiende a un pasajero y devuelve el tiempo de servicio aplicado.
    fn serve(&mut self, passenger: &Arc<Passenger>) -> SimResult<Duration> {
        let started = self.clock.now();
        passenger.begin_service(self.config.index, started)?;

        let ticket = self.ctx.next_service_ticket();
        let service_time = self.service_time(ticket);

        debug!(
            target: "estacion",
            station = self.config.index,
            passenger = passenger.id,
            ticket,
            service_secs = service_time.as_secs_f64(),
            "inicia servicio"
        );

        self.clock.sleep(service_time);

        passenger.complete_service(self.clock.now())?;
        self.ctx.record_service(self.config.index, service_time)?;

        debug!(
            target: "estacion",
            station = self.config.index,
            passenger = passenger.id,
            "servicio completado"
        );
        Ok(service_time)
    }

    /// Tiempo de servicio para el turno global `ticket`.
    ///
    /// Los primeros `k` turnos, con `k` igual al número de estaciones, no
    /// tienen demora: las estaciones arrancan libres y listas.
    fn service_time(&mut self, ticket: usize) -> Duration {
        if ticket < self.ctx.station_count() {
            return Duration::ZERO;
        }
        let offset = self.config.jitter.sample(&mut self.rng);
        jitter::offset_by(self.config.average_service, offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::EventClock;
    use crate::jitter::stream_rng;

    fn setup(passengers: usize, stations: usize) -> (Arc<SimulationContext>, Arc<EventClock>) {
        let passengers = (0..passengers).map(|i| Passenger::new(i, Duration::ZERO)).collect();
        let mut ctx = SimulationContext::new(passengers, stations, Duration::from_secs(4));
        ctx.register_line();
        (Arc::new(ctx), Arc::new(EventClock::new()))
    }

    fn enqueue_all(ctx: &SimulationContext) {
        for passenger in ctx.passengers() {
            passenger.assign_line(0).unwrap();
            passenger.stamp_arrival(Duration::ZERO).unwrap();
            ctx.lines()[0].push(Arc::clone(passenger)).unwrap();
        }
    }

    fn station(index: usize, ctx: &Arc<SimulationContext>, clock: &Arc<EventClock>) -> Station {
        let config = StationConfig {
            index,
            average_service: ctx.average_service(),
            jitter: JitterRange::none(),
        };
        Station::new(
            config,
            Arc::clone(&ctx.lines()[0]),
            Arc::clone(ctx),
            clock.clone(),
            stream_rng(0, index as u64),
        )
    }

    #[test]
    fn test_station_drains_closed_line() {
        let (ctx, clock) = setup(5, 1);
        enqueue_all(&ctx);
        ctx.close_lines();

        let summary = station(0, &ctx, &clock).run().unwrap();

        assert_eq!(summary.served, 5);
        assert_eq!(ctx.passengers_served(), 5);
        // Primer turno sin demora, los otros cuatro de 4 s
        assert_eq!(summary.busy_time, Duration::from_secs(16));
        assert_eq!(clock.now(), Duration::from_secs(16));
        assert!(ctx.line(0).unwrap().is_empty());
    }

    #[test]
    fn test_fifo_order_within_line() {
        let (ctx, clock) = setup(4, 1);
        enqueue_all(&ctx);
        ctx.close_lines();

        station(0, &ctx, &clock).run().unwrap();

        let departures: Vec<Duration> = ctx
            .passengers()
            .iter()
            .map(|p| p.record().departure_time.unwrap())
            .collect();
        assert!(departures.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[test]
    fn test_first_k_tickets_have_no_delay() {
        let (ctx, clock) = setup(6, 3);
        enqueue_all(&ctx);
        ctx.close_lines();

        let mut station = station(0, &ctx, &clock);
        // Los turnos 0..3 corresponden a las 3 estaciones listas
        assert_eq!(station.service_time(0), Duration::ZERO);
        assert_eq!(station.service_time(2), Duration::ZERO);
        assert_eq!(station.service_time(3), Duration::from_secs(4));
    }

    #[test]
    fn test_station_waits_for_close_signal() {
        let (ctx, clock) = setup(2, 1);
        let handle = {
            let station = station(0, &ctx, &clock);
            std::thread::spawn(move || station.run())
        };

        enqueue_all(&ctx);
        ctx.close_lines();

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.served, 2);
        assert!(ctx.passengers().iter().all(|p| p.is_served()));
    }
}
