//! # Módulo de Errores
//!
//! Taxonomía de errores del simulador. Los errores de configuración se
//! detectan antes de lanzar cualquier hilo; el resto son fallas internas que
//! abortan la corrida en lugar de producir un reporte parcial.
//!
//! La cancelación de una espera durante el apagado no es un error: `Line::pop`
//! simplemente devuelve `None`.

use thiserror::Error;

/// Errores que puede producir una corrida de simulación.
#[derive(Debug, Error)]
pub enum SimulationError {
    #[error("duración de simulación inválida: {0} s (debe ser >= 0)")]
    InvalidDuration(i64),

    #[error("intervalo promedio de llegada inválido: {0} s (debe ser > 0)")]
    InvalidArrivalInterval(i64),

    #[error("tiempo promedio de servicio inválido: {0} s (debe ser >= 0)")]
    InvalidServiceTime(i64),

    #[error("política de despacho desconocida: '{0}'")]
    UnknownPolicy(String),

    #[error("se requiere al menos una estación de servicio")]
    NoStations,

    #[error("una política de despacho requiere al menos una fila")]
    NoLines,

    #[error(
        "la política {policy} espera {expected} filas registradas, \
         el contexto tiene {registered}"
    )]
    LinesNotRegistered {
        policy: &'static str,
        expected: usize,
        registered: usize,
    },

    #[error("fila {line} fuera de rango (hay {lines} filas)")]
    LineOutOfRange { line: usize, lines: usize },

    #[error("la fila {0} ya fue cerrada")]
    LineClosed(usize),

    #[error("el pasajero {passenger} ya tiene asignado el campo '{field}'")]
    PassengerAlreadyStamped {
        passenger: usize,
        field: &'static str,
    },

    #[error("el pasajero {0} fue atendido sin fila asignada")]
    PassengerNotAssigned(usize),

    #[error("el contador de pasajeros atendidos excedería el total ({limit})")]
    ServedCounterOverflow { limit: usize },

    #[error("la actividad '{0}' terminó con pánico")]
    ActivityPanicked(String),

    #[error("no se pudo lanzar un hilo: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("corrida incompleta: {served} de {expected} pasajeros atendidos")]
    IncompleteRun { served: usize, expected: usize },

    #[error("la simulación ya fue ejecutada")]
    AlreadyRun,

    #[error("las estadísticas solo existen después de reportar la corrida")]
    NotReported,
}

impl SimulationError {
    /// Indica si el error corresponde a una configuración inválida, es decir,
    /// si fue detectado antes de iniciar cualquier actividad.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidDuration(_)
                | Self::InvalidArrivalInterval(_)
                | Self::InvalidServiceTime(_)
                | Self::UnknownPolicy(_)
                | Self::NoStations
                | Self::NoLines
        )
    }
}

/// Resultado abreviado para todo el crate.
pub type SimResult<T> = Result<T, SimulationError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_classification() {
        assert!(SimulationError::InvalidArrivalInterval(0).is_configuration());
        assert!(SimulationError::UnknownPolicy("lifo".into()).is_configuration());
        assert!(SimulationError::NoStations.is_configuration());
        assert!(!SimulationError::LineClosed(2).is_configuration());
        assert!(!SimulationError::IncompleteRun { served: 1, expected: 2 }.is_configuration());
    }

    #[test]
    fn test_messages_mention_values() {
        let err = SimulationError::LinesNotRegistered {
            policy: "round-robin",
            expected: 5,
            registered: 3,
        };
        let message = err.to_string();
        assert!(message.contains("round-robin"));
        assert!(message.contains('5'));
        assert!(message.contains('3'));
    }
}
