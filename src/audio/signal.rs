use parking_lot::{Condvar, Mutex};
use std::time::Duration;

/// Bandera por nivel sobre la que pueden bloquearse los hilos.
///
/// `set` despierta a todos y la bandera sigue activa hasta `clear`.
#[derive(Debug, Default)]
pub struct Signal {
    flag: Mutex<bool>,
    changed: Condvar,
}

impl Signal {
    pub fn new(initial: bool) -> Self {
        Self {
            flag: Mutex::new(initial),
            changed: Condvar::new(),
        }
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.changed.notify_all();
    }

    pub fn clear(&self) {
        *self.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    pub fn wait(&self) {
        let mut flag = self.flag.lock();
        while !*flag {
            self.changed.wait(&mut flag);
        }
    }

    /// Espera como mucho `timeout`; devuelve el estado de la bandera.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut flag = self.flag.lock();
        if !*flag {
            self.changed.wait_while_for(&mut flag, |set| !*set, timeout);
        }
        *flag
    }
}

/// Contador de transiciones sobre el que se puede esperar.
///
/// A diferencia de [`Signal`], un aviso nunca se pierde: quien espera compara
/// contra el valor que leyó antes de actuar.
#[derive(Debug, Default)]
pub struct Generation {
    count: Mutex<u64>,
    changed: Condvar,
}

impl Generation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> u64 {
        *self.count.lock()
    }

    pub fn bump(&self) {
        let mut count = self.count.lock();
        *count += 1;
        self.changed.notify_all();
    }

    /// Bloquea hasta que el contador supere `seen`; devuelve el valor nuevo.
    pub fn wait_past(&self, seen: u64) -> u64 {
        let mut count = self.count.lock();
        while *count <= seen {
            self.changed.wait(&mut count);
        }
        *count
    }
}
