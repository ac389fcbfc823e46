//! # Módulo de Filas
//!
//! Cola FIFO acotada y bloqueante entre el generador (productor) y las
//! estaciones (consumidoras). Cerrar la fila es la señal de apagado: una
//! estación bloqueada en `pop` despierta y recibe `None` cuando la fila está
//! cerrada y vacía.
//!
//! Si la fila conoce el reloj de la corrida, cada espera se reporta con
//! `activity_blocked` y quien la despierta llama a `activity_resumed` antes de
//! avisar. Con un reloj por eventos eso evita que el tiempo salte mientras un
//! hilo despertado todavía no corre.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::clock::Clock;
use crate::error::{SimResult, SimulationError};
use crate::passenger::Passenger;

/// Fila de espera acotada (items/spaces ~ Condvar).
pub struct Line {
    id: usize,
    inner: Mutex<LineState>,
    not_empty: Condvar,
    not_full: Condvar,
    capacity: usize,
    clock: Option<Arc<dyn Clock>>,
}

#[derive(Debug, Default)]
struct LineState {
    buf: VecDeque<Arc<Passenger>>,
    closed: bool,
    consumers: Waiters,
    producers: Waiters,
}

/// Hilos dormidos en una condición y permisos para despertar.
///
/// Solo sale de la espera quien consume un permiso; así cada despertar queda
/// contado una vez frente al reloj.
#[derive(Debug, Default)]
struct Waiters {
    parked: usize,
    permits: usize,
}

impl Line {
    /// Crea una fila sin reloj asociado. La capacidad mínima es 1.
    pub fn new(id: usize, capacity: usize) -> Arc<Self> {
        Self::build(id, capacity, None)
    }

    /// Crea una fila que reporta sus esperas al reloj de la corrida.
    pub fn with_clock(id: usize, capacity: usize, clock: Arc<dyn Clock>) -> Arc<Self> {
        Self::build(id, capacity, Some(clock))
    }

    fn build(id: usize, capacity: usize, clock: Option<Arc<dyn Clock>>) -> Arc<Self> {
        let capacity = capacity.max(1);
        Arc::new(Self {
            id,
            inner: Mutex::new(LineState {
                buf: VecDeque::with_capacity(capacity),
                ..LineState::default()
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            capacity,
            clock,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Encola un pasajero y devuelve el largo de la fila tras encolarlo.
    ///
    /// El largo se lee bajo el mismo lock del `push`, así que ninguna
    /// observación del máximo histórico se pierde. Si la fila está llena,
    /// espera a que haya espacio.
    ///
    /// # Errors
    ///
    /// `SimulationError::LineClosed` si la fila ya fue cerrada.
    pub fn push(&self, passenger: Arc<Passenger>) -> SimResult<usize> {
        let mut state = self.inner.lock();
        while state.buf.len() == self.capacity && !state.closed {
            self.park(&mut state, Side::Producer);
        }
        if state.closed {
            return Err(SimulationError::LineClosed(self.id));
        }
        state.buf.push_back(passenger);
        let len = state.buf.len();
        self.wake_one(&mut state, Side::Consumer);
        Ok(len)
    }

    /// Saca el siguiente pasajero, bloqueando mientras la fila esté vacía.
    ///
    /// Devuelve `None` solo cuando la fila está cerrada y vacía: una espera
    /// interrumpida por el apagado equivale a "no hay pasajero".
    pub fn pop(&self) -> Option<Arc<Passenger>> {
        let mut state = self.inner.lock();
        loop {
            if let Some(passenger) = state.buf.pop_front() {
                self.wake_one(&mut state, Side::Producer);
                return Some(passenger);
            }
            if state.closed {
                return None;
            }
            self.park(&mut state, Side::Consumer);
        }
    }

    /// Cierra la fila y despierta a todos los hilos en espera.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        state.closed = true;
        for side in [Side::Consumer, Side::Producer] {
            let parked = std::mem::take(&mut state.waiters(side).parked);
            for _ in 0..parked {
                self.resume_one();
            }
            state.waiters(side).permits += parked;
        }
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn condvar(&self, side: Side) -> &Condvar {
        match side {
            Side::Consumer => &self.not_empty,
            Side::Producer => &self.not_full,
        }
    }

    /// Duerme hasta recibir un permiso del lado indicado.
    fn park(&self, state: &mut MutexGuard<'_, LineState>, side: Side) {
        state.waiters(side).parked += 1;
        if let Some(clock) = &self.clock {
            clock.activity_blocked();
        }
        while state.waiters(side).permits == 0 {
            self.condvar(side).wait(state);
        }
        state.waiters(side).permits -= 1;
    }

    /// Despierta a un hilo dormido del lado indicado, si hay alguno.
    fn wake_one(&self, state: &mut MutexGuard<'_, LineState>, side: Side) {
        let waiters = state.waiters(side);
        if waiters.parked == 0 {
            return;
        }
        waiters.parked -= 1;
        waiters.permits += 1;
        self.resume_one();
        self.condvar(side).notify_one();
    }

    fn resume_one(&self) {
        if let Some(clock) = &self.clock {
            clock.activity_resumed();
        }
    }
}

impl fmt::Debug for Line {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Line")
            .field("id", &self.id)
            .field("capacity", &self.capacity)
            .field("clocked", &self.clock.is_some())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Side {
    Consumer,
    Producer,
}

impl LineState {
    fn waiters(&mut self, side: Side) -> &mut Waiters {
        match side {
            Side::Consumer => &mut self.consumers,
            Side::Producer => &mut self.producers,
        }
    }
}
