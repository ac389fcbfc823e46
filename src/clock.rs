//! # Módulo de Reloj Virtual
//!
//! Toda la simulación mide el tiempo como un `Duration` transcurrido desde el
//! inicio de la corrida. El generador y las estaciones nunca llaman a
//! `thread::sleep` directamente: se suspenden a través de un [`Clock`], lo que
//! permite correr la misma simulación en tiempo real, en tiempo escalado o
//! por eventos discretos.
//!
//! Para el reloj por eventos ([`EventClock`]) cada actividad se registra con
//! un [`ActivityGuard`] y avisa cuando queda bloqueada fuera del reloj (por
//! ejemplo, esperando en una fila vacía). El tiempo solo avanza cuando todas
//! las actividades registradas están bloqueadas.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// Fuente de tiempo virtual compartida por todas las actividades de una corrida.
pub trait Clock: Send + Sync {
    /// Tiempo virtual transcurrido desde el origen del reloj.
    fn now(&self) -> Duration;

    /// Suspende la actividad que llama hasta que el tiempo virtual alcance
    /// `deadline`. Si ya pasó, retorna de inmediato.
    fn sleep_until(&self, deadline: Duration);

    /// Suspende la actividad que llama durante `duration` de tiempo virtual.
    fn sleep(&self, duration: Duration) {
        self.sleep_until(self.now().saturating_add(duration));
    }

    /// Una actividad nueva participa en el avance del tiempo.
    fn register_activity(&self) {}

    /// Una actividad registrada terminó.
    fn activity_finished(&self) {}

    /// La actividad que llama queda bloqueada en algo que no es el reloj.
    fn activity_blocked(&self) {}

    /// Una actividad bloqueada con `activity_blocked` vuelve a correr.
    ///
    /// Lo invoca quien la despierta, antes de despertarla.
    fn activity_resumed(&self) {}
}

/// Registro de una actividad en el reloj mientras viva el guardia.
///
/// Al soltarse (fin normal, error o pánico del hilo) la actividad deja de
/// contar para el avance del tiempo.
pub struct ActivityGuard {
    clock: Arc<dyn Clock>,
}

impl ActivityGuard {
    pub fn register(clock: Arc<dyn Clock>) -> Self {
        clock.register_activity();
        Self { clock }
    }
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.clock.activity_finished();
    }
}

/// Reloj respaldado por el reloj monotónico del sistema, con un factor de
/// escala: un segundo simulado equivale a `real_per_sim_second` de tiempo real.
#[derive(Debug, Clone)]
pub struct ScaledClock {
    origin: Instant,
    real_per_sim_second: Duration,
}

impl ScaledClock {
    /// Resolución mínima de la escala; evita divisiones por cero.
    const MIN_SCALE: Duration = Duration::from_micros(1);

    /// Crea un reloj cuyo origen es el instante actual.
    ///
    /// # Arguments
    ///
    /// * `real_per_sim_second` - Tiempo real que dura un segundo simulado
    ///
    /// # Examples
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use passenger_queue_simulator::{Clock, ScaledClock};
    ///
    /// let clock = ScaledClock::new(Duration::from_millis(1));
    /// clock.sleep(Duration::from_secs(2)); // ~2 ms reales
    /// assert!(clock.now() >= Duration::from_secs(1));
    /// ```
    pub fn new(real_per_sim_second: Duration) -> Self {
        Self {
            origin: Instant::now(),
            real_per_sim_second: real_per_sim_second.max(Self::MIN_SCALE),
        }
    }

    /// Reloj sin escala: un segundo simulado dura un segundo real.
    pub fn real_time() -> Self {
        Self::new(Duration::from_secs(1))
    }

    /// Tiempo real que dura un segundo simulado.
    pub fn scale(&self) -> Duration {
        self.real_per_sim_second
    }

    /// Convierte tiempo virtual a real; satura en `Duration::MAX`.
    fn to_real(&self, virtual_time: Duration) -> Duration {
        let secs = virtual_time.as_secs_f64() * self.real_per_sim_second.as_secs_f64();
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

impl Clock for ScaledClock {
    fn now(&self) -> Duration {
        let real = self.origin.elapsed();
        let secs = real.as_secs_f64() / self.real_per_sim_second.as_secs_f64();
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }

    fn sleep_until(&self, deadline: Duration) {
        let real = self.to_real(deadline);
        match self.origin.checked_add(real) {
            Some(target) => {
                let now = Instant::now();
                if target > now {
                    thread::sleep(target - now);
                }
            }
            // Plazo fuera del rango de Instant: no se alcanza nunca
            None => thread::sleep(real),
        }
    }
}

/// Reloj de eventos discretos.
///
/// Nunca duerme en tiempo real. Cuando todas las actividades registradas
/// están bloqueadas (en `sleep_until` o avisando `activity_blocked`), salta
/// al plazo pendiente más cercano y despierta a quienes lo pidieron. Así las
/// esperas entre hilos se conservan igual que en tiempo real, y una corrida
/// completa termina en lo que tarden los hilos en intercambiar turnos.
///
/// Un hilo que duerme sin haberse registrado también cuenta como bloqueado,
/// de modo que un único hilo sin registro avanza el reloj directamente.
#[derive(Debug, Default)]
pub struct EventClock {
    timeline: Mutex<Timeline>,
    tick: Condvar,
}

#[derive(Debug, Default)]
struct Timeline {
    now: Duration,
    registered: usize,
    blocked: usize,
    deadlines: BinaryHeap<Reverse<Duration>>,
}

impl Timeline {
    /// Si nadie puede avanzar, salta al siguiente plazo y libera a todos los
    /// que vencen en ese instante. Devuelve `true` si el tiempo avanzó.
    fn advance_if_idle(&mut self) -> bool {
        if self.blocked < self.registered {
            return false;
        }
        let Some(Reverse(next)) = self.deadlines.peek().copied() else {
            return false;
        };
        self.now = self.now.max(next);
        while let Some(Reverse(deadline)) = self.deadlines.peek().copied() {
            if deadline > self.now {
                break;
            }
            self.deadlines.pop();
            self.blocked = self.blocked.saturating_sub(1);
        }
        true
    }
}

impl EventClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Número de actividades registradas que siguen vivas.
    pub fn active_activities(&self) -> usize {
        self.timeline.lock().registered
    }

    fn update(&self, change: impl FnOnce(&mut Timeline)) {
        let mut timeline = self.timeline.lock();
        change(&mut timeline);
        if timeline.advance_if_idle() {
            self.tick.notify_all();
        }
    }
}

impl Clock for EventClock {
    fn now(&self) -> Duration {
        self.timeline.lock().now
    }

    fn sleep_until(&self, deadline: Duration) {
        let mut timeline = self.timeline.lock();
        if deadline <= timeline.now {
            return;
        }
        timeline.deadlines.push(Reverse(deadline));
        timeline.blocked += 1;
        if timeline.advance_if_idle() {
            self.tick.notify_all();
        }
        while timeline.now < deadline {
            self.tick.wait(&mut timeline);
        }
    }

    fn register_activity(&self) {
        self.timeline.lock().registered += 1;
    }

    fn activity_finished(&self) {
        self.update(|t| t.registered = t.registered.saturating_sub(1));
    }

    fn activity_blocked(&self) {
        self.update(|t| t.blocked += 1);
    }

    fn activity_resumed(&self) {
        let mut timeline = self.timeline.lock();
        timeline.blocked = timeline.blocked.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_thread_jumps_to_deadlines() {
        let clock = EventClock::new();
        clock.sleep_until(Duration::from_secs(10));
        assert_eq!(clock.now(), Duration::from_secs(10));

        // Un plazo en el pasado no retrocede el reloj
        clock.sleep_until(Duration::from_secs(3));
        assert_eq!(clock.now(), Duration::from_secs(10));

        clock.sleep(Duration::from_secs(5));
        assert_eq!(clock.now(), Duration::from_secs(15));
    }

    #[test]
    fn test_concurrent_sleeps_overlap() {
        // Dos actividades que duermen 4 y 6 s a la vez terminan en t = 6,
        // no en t = 10
        let clock: Arc<EventClock> = Arc::new(EventClock::new());
        let handles: Vec<_> = [4u64, 6]
            .into_iter()
            .map(|secs| {
                let guard = ActivityGuard::register(clock.clone());
                let clock = Arc::clone(&clock);
                thread::spawn(move || {
                    let _guard = guard;
                    clock.sleep(Duration::from_secs(secs));
                    clock.now()
                })
            })
            .collect();

        let woke: Vec<Duration> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(woke, vec![Duration::from_secs(4), Duration::from_secs(6)]);
        assert_eq!(clock.now(), Duration::from_secs(6));
        assert_eq!(clock.active_activities(), 0);
    }

    #[test]
    fn test_time_waits_for_running_activity() {
        let clock: Arc<EventClock> = Arc::new(EventClock::new());
        let busy = ActivityGuard::register(clock.clone());

        let sleeper = {
            let guard = ActivityGuard::register(clock.clone());
            let clock = Arc::clone(&clock);
            thread::spawn(move || {
                let _guard = guard;
                clock.sleep_until(Duration::from_secs(8));
                clock.now()
            })
        };

        // Mientras la otra actividad corre, el tiempo no avanza
        thread::sleep(Duration::from_millis(20));
        assert_eq!(clock.now(), Duration::ZERO);

        // Bloquearse fuera del reloj cuenta como inactividad
        clock.activity_blocked();
        assert_eq!(sleeper.join().unwrap(), Duration::from_secs(8));
        clock.activity_resumed();
        drop(busy);
        assert_eq!(clock.active_activities(), 0);
    }

    #[test]
    fn test_scaled_clock_compresses_time() {
        let clock = ScaledClock::new(Duration::from_millis(1));
        let started = Instant::now();

        clock.sleep_until(Duration::from_secs(20));

        assert!(clock.now() >= Duration::from_secs(19));
        // 20 segundos simulados deben tomar mucho menos de un segundo real
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_scaled_clock_rejects_zero_scale() {
        let clock = ScaledClock::new(Duration::ZERO);
        assert_eq!(clock.scale(), Duration::from_micros(1));
        // No debe producir NaN ni pánico
        let _ = clock.now();
    }

    #[test]
    fn test_scaled_clock_saturates_huge_deadlines() {
        let clock = ScaledClock::new(Duration::from_secs(3600));
        assert_eq!(clock.to_real(Duration::MAX), Duration::MAX);
        assert_eq!(clock.to_real(Duration::from_secs(2)), Duration::from_secs(7200));
        // Un plazo ya vencido retorna sin calcular el instante objetivo
        clock.sleep_until(Duration::ZERO);
    }
}
