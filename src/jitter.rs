//! # Módulo de Jitter
//!
//! Pequeños ajustes aleatorios y simétricos, en segundos enteros, que se
//! aplican a los tiempos de llegada y de servicio.
//!
//! Cada actividad (generador, política aleatoria, estación) tiene su propio
//! `ChaCha8Rng` derivado de la semilla de la corrida, así ningún hilo comparte
//! estado de aleatoriedad.

use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Parte fraccionaria de la razón áurea en 64 bits, para mezclar semillas.
const MIXING_CONSTANT: u64 = 0x9e37_79b9_7f4a_7c15;

/// Flujo de aleatoriedad del generador de llegadas.
pub const GENERATOR_STREAM: u64 = 0;
/// Flujo de aleatoriedad de la política de despacho aleatoria.
pub const DISPATCH_STREAM: u64 = 1;
/// Primer flujo de las estaciones; la estación `i` usa `STATION_STREAM_BASE + i`.
pub const STATION_STREAM_BASE: u64 = 16;

/// Rango simétrico de jitter `[-max_secs, max_secs]` en segundos enteros.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JitterRange {
    max_secs: u64,
}

impl JitterRange {
    pub fn new(max_secs: u64) -> Self {
        Self { max_secs }
    }

    /// Rango vacío: todos los tiempos son exactamente los promedios.
    pub fn none() -> Self {
        Self { max_secs: 0 }
    }

    pub fn max_secs(&self) -> u64 {
        self.max_secs
    }

    /// Obtiene un ajuste uniforme en `[-max_secs, max_secs]`.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> i64 {
        if self.max_secs == 0 {
            return 0;
        }
        let bound = i64::try_from(self.max_secs).unwrap_or(i64::MAX);
        rng.gen_range(-bound..=bound)
    }
}

/// Aplica un ajuste en segundos a `base`, sin bajar de cero.
pub fn offset_by(base: Duration, offset_secs: i64) -> Duration {
    let magnitude = Duration::from_secs(offset_secs.unsigned_abs());
    if offset_secs >= 0 {
        base + magnitude
    } else {
        base.saturating_sub(magnitude)
    }
}

/// Diferencia con signo `actual - expected`, en milisegundos.
pub fn signed_millis(actual: Duration, expected: Duration) -> i64 {
    let to_millis = |d: Duration| i64::try_from(d.as_millis()).unwrap_or(i64::MAX);
    to_millis(actual) - to_millis(expected)
}

/// Crea un generador reproducible para un flujo de la corrida.
pub fn stream_rng(seed: u64, stream: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed ^ stream.wrapping_mul(MIXING_CONSTANT))
}
