//! # Módulo de Pasajeros
//!
//! Este módulo define a los pasajeros que atraviesan la simulación y los
//! sellos de tiempo que registran su paso por una fila y una estación.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::error::{SimResult, SimulationError};

/// Sellos de tiempo y asignaciones de un pasajero.
///
/// Todos los tiempos son tiempo virtual relativo al inicio de la corrida.
/// Cada campo se escribe una sola vez.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassengerRecord {
    /// Momento en que el pasajero entró a su fila
    pub arrival_time: Option<Duration>,
    /// Momento en que una estación lo sacó de la fila
    pub departure_time: Option<Duration>,
    /// Momento en que terminó su servicio
    pub service_completed_at: Option<Duration>,
    /// Fila elegida por la política de despacho
    pub assigned_line: Option<usize>,
    /// Estación que lo atendió
    pub served_by: Option<usize>,
}

impl PassengerRecord {
    /// Tiempo de espera en la fila, si ya fue atendido.
    pub fn wait_time(&self) -> Option<Duration> {
        let arrival = self.arrival_time?;
        let departure = self.departure_time?;
        departure.checked_sub(arrival)
    }
}

/// Representa un pasajero que llega a la instalación.
///
/// Se comparte como `Arc<Passenger>` entre el contexto (para estadísticas),
/// la fila donde espera y la estación que lo atiende. El `Mutex` protege los
/// sellos de tiempo; la identidad es inmutable.
#[derive(Debug)]
pub struct Passenger {
    /// Identificador único (0-indexado, igual a su índice de llegada)
    pub id: usize,
    /// Llegada planificada por el generador
    pub scheduled_arrival: Duration,
    record: Mutex<PassengerRecord>,
}

impl Passenger {
    /// Crea un pasajero listo para ser compartido entre hilos.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use passenger_queue_simulator::Passenger;
    ///
    /// let passenger = Passenger::new(3, Duration::from_secs(12));
    /// assert_eq!(passenger.id, 3);
    /// assert!(passenger.record().arrival_time.is_none());
    /// ```
    pub fn new(id: usize, scheduled_arrival: Duration) -> Arc<Self> {
        Arc::new(Self {
            id,
            scheduled_arrival,
            record: Mutex::new(PassengerRecord::default()),
        })
    }

    /// Copia del estado actual del pasajero.
    pub fn record(&self) -> PassengerRecord {
        *self.record.lock()
    }

    /// Registra la fila elegida por la política de despacho.
    pub fn assign_line(&self, line: usize) -> SimResult<()> {
        let mut record = self.record.lock();
        set_once(&mut record.assigned_line, line, self.id, "assigned_line")
    }

    /// Registra la llegada a la fila.
    pub fn stamp_arrival(&self, at: Duration) -> SimResult<()> {
        let mut record = self.record.lock();
        set_once(&mut record.arrival_time, at, self.id, "arrival_time")
    }

    /// Registra la salida de la fila hacia una estación.
    ///
    /// Falla si el pasajero no tiene fila asignada o si ya fue tomado por
    /// otra estación.
    pub fn begin_service(&self, station: usize, at: Duration) -> SimResult<()> {
        let mut record = self.record.lock();
        if record.assigned_line.is_none() {
            return Err(SimulationError::PassengerNotAssigned(self.id));
        }
        if record.served_by.is_some() || record.departure_time.is_some() {
            return Err(SimulationError::PassengerAlreadyStamped {
                passenger: self.id,
                field: "served_by",
            });
        }
        record.served_by = Some(station);
        record.departure_time = Some(at);
        Ok(())
    }

    /// Registra el fin del servicio.
    pub fn complete_service(&self, at: Duration) -> SimResult<()> {
        let mut record = self.record.lock();
        set_once(&mut record.service_completed_at, at, self.id, "service_completed_at")
    }

    /// Tiempo de espera en la fila, si ya fue atendido.
    pub fn wait_time(&self) -> Option<Duration> {
        self.record().wait_time()
    }

    pub fn is_served(&self) -> bool {
        self.record.lock().served_by.is_some()
    }
}

fn set_once<T>(
    slot: &mut Option<T>,
    value: T,
    passenger: usize,
    field: &'static str,
) -> SimResult<()> {
    if slot.is_some() {
        return Err(SimulationError::PassengerAlreadyStamped { passenger, field });
    }
    *slot = Some(value);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_lifecycle() {
        let passenger = Passenger::new(0, Duration::from_secs(4));
        passenger.assign_line(2).unwrap();
        passenger.stamp_arrival(Duration::from_secs(5)).unwrap();
        passenger.begin_service(1, Duration::from_secs(9)).unwrap();
        passenger.complete_service(Duration::from_secs(12)).unwrap();

        let record = passenger.record();
        assert_eq!(record.assigned_line, Some(2));
        assert_eq!(record.served_by, Some(1));
        assert_eq!(passenger.wait_time(), Some(Duration::from_secs(4)));
        assert!(passenger.is_served());
    }

    #[test]
    fn test_fields_are_set_once() {
        let passenger = Passenger::new(7, Duration::ZERO);
        passenger.assign_line(0).unwrap();
        passenger.stamp_arrival(Duration::ZERO).unwrap();

        assert!(matches!(
            passenger.assign_line(1),
            Err(SimulationError::PassengerAlreadyStamped { passenger: 7, field: "assigned_line" })
        ));
        assert!(passenger.stamp_arrival(Duration::from_secs(1)).is_err());

        passenger.begin_service(0, Duration::from_secs(1)).unwrap();
        assert!(passenger.begin_service(3, Duration::from_secs(2)).is_err());
        // La primera estación se conserva
        assert_eq!(passenger.record().served_by, Some(0));
    }

    #[test]
    fn test_service_requires_assignment() {
        let passenger = Passenger::new(1, Duration::ZERO);
        assert!(matches!(
            passenger.begin_service(0, Duration::ZERO),
            Err(SimulationError::PassengerNotAssigned(1))
        ));
    }

    #[test]
    fn test_wait_time_unknown_while_in_flight() {
        let passenger = Passenger::new(2, Duration::ZERO);
        passenger.assign_line(0).unwrap();
        passenger.stamp_arrival(Duration::from_secs(3)).unwrap();
        assert_eq!(passenger.wait_time(), None);
    }
}
