//! # Módulo de Contexto de Simulación
//!
//! Estado compartido de una sola corrida: las filas, los contadores globales,
//! el máximo histórico de largo por fila y el arreglo completo de pasajeros.
//! Se construye durante la configuración (donde se registran las filas) y
//! luego se comparte como `Arc<SimulationContext>` con el generador y las
//! estaciones. Todo lo que se modifica en paralelo es atómico.

use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::{SimResult, SimulationError};
use crate::jitter;
use crate::line::Line;
use crate::passenger::Passenger;

/// Contadores de una estación de servicio.
#[derive(Debug, Default)]
pub struct StationTally {
    served: AtomicUsize,
    busy_millis: AtomicU64,
    jitter_millis: AtomicI64,
}

impl StationTally {
    pub fn served(&self) -> usize {
        self.served.load(Ordering::SeqCst)
    }

    /// Tiempo de servicio efectivo acumulado.
    pub fn busy_time(&self) -> Duration {
        Duration::from_millis(self.busy_millis.load(Ordering::SeqCst))
    }

    /// Desviación acumulada respecto al tiempo promedio de servicio.
    pub fn jitter_millis(&self) -> i64 {
        self.jitter_millis.load(Ordering::SeqCst)
    }
}

/// Estado por corrida compartido por todas las actividades.
#[derive(Debug)]
pub struct SimulationContext {
    lines: Vec<Arc<Line>>,
    longest_lengths: Vec<AtomicUsize>,
    assigned_counts: Vec<AtomicUsize>,
    stations: Vec<StationTally>,
    passengers: Vec<Arc<Passenger>>,
    passengers_served: AtomicUsize,
    service_tickets: AtomicUsize,
    jitter_millis: AtomicI64,
    average_service: Duration,
}

impl SimulationContext {
    /// Crea un contexto sin filas registradas.
    ///
    /// # Arguments
    ///
    /// * `passengers` - Arreglo completo de pasajeros de la corrida
    /// * `station_count` - Número de estaciones de servicio
    /// * `average_service` - Tiempo promedio de servicio configurado
    pub fn new(
        passengers: Vec<Arc<Passenger>>,
        station_count: usize,
        average_service: Duration,
    ) -> Self {
        Self {
            lines: Vec::new(),
            longest_lengths: Vec::new(),
            assigned_counts: Vec::new(),
            stations: (0..station_count).map(|_| StationTally::default()).collect(),
            passengers,
            passengers_served: AtomicUsize::new(0),
            service_tickets: AtomicUsize::new(0),
            jitter_millis: AtomicI64::new(0),
            average_service,
        }
    }

    /// Registra una nueva fila con capacidad para todos los pasajeros y
    /// devuelve su índice.
    pub fn register_line(&mut self) -> usize {
        let line = Line::new(self.lines.len(), self.passengers.len());
        self.push_line(line)
    }

    /// Igual que [`register_line`](Self::register_line), pero la fila
    /// reporta sus esperas al reloj de la corrida.
    pub fn register_clocked_line(&mut self, clock: &Arc<dyn Clock>) -> usize {
        let line = Line::with_clock(self.lines.len(), self.passengers.len(), Arc::clone(clock));
        self.push_line(line)
    }

    fn push_line(&mut self, line: Arc<Line>) -> usize {
        let id = self.lines.len();
        self.lines.push(line);
        self.longest_lengths.push(AtomicUsize::new(0));
        self.assigned_counts.push(AtomicUsize::new(0));
        id
    }

    pub fn lines(&self) -> &[Arc<Line>] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Obtiene una fila por índice.
    pub fn line(&self, index: usize) -> SimResult<&Arc<Line>> {
        self.lines.get(index).ok_or(SimulationError::LineOutOfRange {
            line: index,
            lines: self.lines.len(),
        })
    }

    pub fn passengers(&self) -> &[Arc<Passenger>] {
        &self.passengers
    }

    pub fn passenger_count(&self) -> usize {
        self.passengers.len()
    }

    pub fn station_count(&self) -> usize {
        self.stations.len()
    }

    pub fn stations(&self) -> &[StationTally] {
        &self.stations
    }

    pub fn average_service(&self) -> Duration {
        self.average_service
    }

    /// Actualiza el máximo histórico de largo de una fila.
    ///
    /// El máximo nunca disminuye, aunque las observaciones lleguen fuera de
    /// orden desde distintos hilos.
    pub fn observe_line_length(&self, line: usize, length: usize) -> SimResult<()> {
        let slot = self.longest_lengths.get(line).ok_or(SimulationError::LineOutOfRange {
            line,
            lines: self.lines.len(),
        })?;
        slot.fetch_max(length, Ordering::SeqCst);
        Ok(())
    }

    pub fn longest_length(&self, line: usize) -> usize {
        self.longest_lengths
            .get(line)
            .map(|slot| slot.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Cuenta una asignación hecha por la política de despacho.
    pub fn record_assignment(&self, line: usize) -> SimResult<()> {
        let slot = self.assigned_counts.get(line).ok_or(SimulationError::LineOutOfRange {
            line,
            lines: self.lines.len(),
        })?;
        slot.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    /// Pasajeros asignados históricamente a una fila.
    pub fn assigned_count(&self, line: usize) -> usize {
        self.assigned_counts
            .get(line)
            .map(|slot| slot.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Entrega el siguiente turno de servicio global (0, 1, 2, ...).
    pub fn next_service_ticket(&self) -> usize {
        self.service_tickets.fetch_add(1, Ordering::SeqCst)
    }

    /// Registra un servicio terminado por una estación.
    ///
    /// # Errors
    ///
    /// `ServedCounterOverflow` si el contador superaría el total de pasajeros.
    pub fn record_service(&self, station: usize, service_time: Duration) -> SimResult<()> {
        let limit = self.passengers.len();
        self.passengers_served
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |served| {
                (served < limit).then_some(served + 1)
            })
            .map_err(|_| SimulationError::ServedCounterOverflow { limit })?;

        let deviation = jitter::signed_millis(service_time, self.average_service);
        self.jitter_millis.fetch_add(deviation, Ordering::SeqCst);

        if let Some(tally) = self.stations.get(station) {
            tally.served.fetch_add(1, Ordering::SeqCst);
            let busy = u64::try_from(service_time.as_millis()).unwrap_or(u64::MAX);
            tally.busy_millis.fetch_add(busy, Ordering::SeqCst);
            tally.jitter_millis.fetch_add(deviation, Ordering::SeqCst);
        }
        Ok(())
    }

    pub fn passengers_served(&self) -> usize {
        self.passengers_served.load(Ordering::SeqCst)
    }

    /// Desviación acumulada de todos los servicios, en milisegundos.
    pub fn cumulative_jitter_millis(&self) -> i64 {
        self.jitter_millis.load(Ordering::SeqCst)
    }

    /// Cierra todas las filas: no llegarán más pasajeros.
    pub fn close_lines(&self) {
        for line in &self.lines {
            line.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn context(passengers: usize, stations: usize) -> SimulationContext {
        let passengers = (0..passengers).map(|i| Passenger::new(i, Duration::ZERO)).collect();
        SimulationContext::new(passengers, stations, Duration::from_secs(3))
    }

    #[test]
    fn test_register_lines() {
        let mut ctx = context(10, 2);
        assert_eq!(ctx.register_line(), 0);
        assert_eq!(ctx.register_line(), 1);
        assert_eq!(ctx.line_count(), 2);
        assert_eq!(ctx.line(1).unwrap().capacity(), 10);
        assert!(matches!(
            ctx.line(2),
            Err(SimulationError::LineOutOfRange { line: 2, lines: 2 })
        ));
    }

    #[test]
    fn test_longest_length_is_monotonic() {
        let mut ctx = context(10, 1);
        ctx.register_line();
        ctx.observe_line_length(0, 3).unwrap();
        ctx.observe_line_length(0, 1).unwrap();
        assert_eq!(ctx.longest_length(0), 3);
        ctx.observe_line_length(0, 4).unwrap();
        assert_eq!(ctx.longest_length(0), 4);
        assert!(ctx.observe_line_length(5, 1).is_err());
    }

    #[test]
    fn test_record_service_tracks_jitter() {
        let ctx = context(4, 2);
        ctx.record_service(0, Duration::from_secs(5)).unwrap();
        ctx.record_service(1, Duration::from_secs(1)).unwrap();

        assert_eq!(ctx.passengers_served(), 2);
        assert_eq!(ctx.cumulative_jitter_millis(), 2000 - 2000);
        assert_eq!(ctx.stations()[0].served(), 1);
        assert_eq!(ctx.stations()[0].jitter_millis(), 2000);
        assert_eq!(ctx.stations()[1].busy_time(), Duration::from_secs(1));
    }

    #[test]
    fn test_served_counter_never_exceeds_passengers() {
        let ctx = context(2, 1);
        ctx.record_service(0, Duration::ZERO).unwrap();
        ctx.record_service(0, Duration::ZERO).unwrap();
        assert!(matches!(
            ctx.record_service(0, Duration::ZERO),
            Err(SimulationError::ServedCounterOverflow { limit: 2 })
        ));
        assert_eq!(ctx.passengers_served(), 2);
    }

    #[test]
    fn test_concurrent_updates_are_not_lost() {
        let mut ctx = context(8_000, 8);
        ctx.register_line();
        let ctx = Arc::new(ctx);

        let handles: Vec<_> = (0..8)
            .map(|station| {
                let ctx = Arc::clone(&ctx);
                thread::spawn(move || {
                    for i in 0..1_000 {
                        ctx.record_service(station, Duration::from_secs(3)).unwrap();
                        ctx.observe_line_length(0, station * 1_000 + i).unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ctx.passengers_served(), 8_000);
        assert_eq!(ctx.longest_length(0), 7_999);
        assert!(ctx.stations().iter().all(|tally| tally.served() == 1_000));
    }
}
