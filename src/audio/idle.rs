//! Desconexión por inactividad.
//!
//! Cada [`DisconnectReason`] tiene como mucho un plazo pendiente. Todos los
//! plazos viven en una sola rueda atendida por un hilo, que se reevalúa al
//! armar o desarmar un motivo. Al vencer un plazo, el motivo sale de la rueda
//! y se ejecuta la acción de salida.

use parking_lot::{Condvar, Mutex};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{MusicError, MusicResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    NotPlaying,
    AloneInChannel,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::NotPlaying => f.write_str("inactividad"),
            DisconnectReason::AloneInChannel => f.write_str("canal vacío"),
        }
    }
}

/// Acción que ejecuta el hilo de la rueda cuando vence un plazo.
pub type ExpireAction = Arc<dyn Fn(DisconnectReason) + Send + Sync>;

#[derive(Default)]
struct Wheel {
    deadlines: HashMap<DisconnectReason, Instant>,
    shutdown: bool,
}

struct Shared {
    wheel: Mutex<Wheel>,
    changed: Condvar,
}

pub struct IdlePolicy {
    shared: Arc<Shared>,
    default_delay: Duration,
}

impl IdlePolicy {
    /// Arranca el hilo de la rueda. `on_expire` suele cerrar la sesión.
    pub fn new(default_delay: Duration, on_expire: ExpireAction) -> Self {
        let shared = Arc::new(Shared {
            wheel: Mutex::new(Wheel::default()),
            changed: Condvar::new(),
        });

        let worker = shared.clone();
        let spawned = thread::Builder::new()
            .name("zemo-idle".into())
            .spawn(move || run_wheel(worker, on_expire));
        if let Err(e) = spawned {
            warn!("⚠️ No se pudo iniciar el temporizador de inactividad: {}", e);
        }

        Self {
            shared,
            default_delay,
        }
    }

    pub fn default_delay(&self) -> Duration {
        self.default_delay
    }

    /// Programa la salida por `reason` tras `delay` (o el plazo por defecto).
    ///
    /// Falla con [`MusicError::AlreadyArmed`] si `reason` ya está pendiente;
    /// hay que llamar antes a [`disarm`](Self::disarm).
    pub fn arm(&self, reason: DisconnectReason, delay: Option<Duration>) -> MusicResult<()> {
        let delay = delay.unwrap_or(self.default_delay);
        let mut wheel = self.shared.wheel.lock();

        if wheel.deadlines.contains_key(&reason) {
            return Err(MusicError::AlreadyArmed(reason));
        }

        wheel.deadlines.insert(reason, Instant::now() + delay);
        self.shared.changed.notify_all();
        debug!("⏳ Temporizador de {} armado ({:?})", reason, delay);
        Ok(())
    }

    /// Cancela el plazo pendiente de `reason`, si lo hay.
    pub fn disarm(&self, reason: DisconnectReason) {
        let mut wheel = self.shared.wheel.lock();
        if wheel.deadlines.remove(&reason).is_some() {
            self.shared.changed.notify_all();
            debug!("⌛ Temporizador de {} cancelado", reason);
        }
    }

    pub fn disarm_all(&self) {
        let mut wheel = self.shared.wheel.lock();
        wheel.deadlines.clear();
        self.shared.changed.notify_all();
    }

    pub fn is_armed(&self, reason: DisconnectReason) -> bool {
        self.shared.wheel.lock().deadlines.contains_key(&reason)
    }

    /// Detiene el hilo de la rueda; los plazos pendientes ya no vencen.
    pub fn shutdown(&self) {
        let mut wheel = self.shared.wheel.lock();
        wheel.shutdown = true;
        wheel.deadlines.clear();
        self.shared.changed.notify_all();
    }
}

impl Drop for IdlePolicy {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_wheel(shared: Arc<Shared>, on_expire: ExpireAction) {
    let mut wheel = shared.wheel.lock();

    loop {
        if wheel.shutdown {
            return;
        }

        let earliest = wheel
            .deadlines
            .iter()
            .min_by_key(|(_, deadline)| **deadline)
            .map(|(reason, deadline)| (*reason, *deadline));

        match earliest {
            None => shared.changed.wait(&mut wheel),
            Some((reason, deadline)) if deadline <= Instant::now() => {
                wheel.deadlines.remove(&reason);
                info!("⏰ Tiempo agotado por {}, saliendo del canal", reason);
                // La acción puede volver a llamar a la política.
                parking_lot::MutexGuard::unlocked(&mut wheel, || on_expire(reason));
            }
            Some((_, deadline)) => {
                shared.changed.wait_until(&mut wheel, deadline);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;

    fn recording_policy(delay: Duration) -> (IdlePolicy, Arc<PlMutex<Vec<DisconnectReason>>>) {
        let fired = Arc::new(PlMutex::new(Vec::new()));
        let sink = fired.clone();
        let policy = IdlePolicy::new(
            delay,
            Arc::new(move |reason: DisconnectReason| sink.lock().push(reason)),
        );
        (policy, fired)
    }

    #[test]
    fn arming_twice_is_rejected() {
        let (policy, _) = recording_policy(Duration::from_secs(60));
        policy.arm(DisconnectReason::NotPlaying, None).unwrap();

        let err = policy.arm(DisconnectReason::NotPlaying, None).unwrap_err();
        assert!(matches!(
            err,
            MusicError::AlreadyArmed(DisconnectReason::NotPlaying)
        ));

        policy.arm(DisconnectReason::AloneInChannel, None).unwrap();
    }

    #[test]
    fn expired_reason_fires_once_and_can_be_rearmed() {
        let (policy, fired) = recording_policy(Duration::from_millis(20));
        policy.arm(DisconnectReason::NotPlaying, None).unwrap();

        thread::sleep(Duration::from_millis(200));
        assert_eq!(*fired.lock(), vec![DisconnectReason::NotPlaying]);
        assert!(!policy.is_armed(DisconnectReason::NotPlaying));

        // Cancelar tras el vencimiento no hace nada.
        policy.disarm(DisconnectReason::NotPlaying);
        policy.arm(DisconnectReason::NotPlaying, None).unwrap();
    }

    #[test]
    fn disarmed_reason_never_fires() {
        let (policy, fired) = recording_policy(Duration::from_millis(50));
        policy.arm(DisconnectReason::AloneInChannel, None).unwrap();
        policy.disarm(DisconnectReason::AloneInChannel);

        thread::sleep(Duration::from_millis(200));
        assert!(fired.lock().is_empty());
    }

    #[test]
    fn earlier_deadline_fires_first() {
        let (policy, fired) = recording_policy(Duration::from_secs(60));
        policy
            .arm(DisconnectReason::NotPlaying, Some(Duration::from_millis(150)))
            .unwrap();
        policy
            .arm(DisconnectReason::AloneInChannel, Some(Duration::from_millis(20)))
            .unwrap();

        thread::sleep(Duration::from_millis(80));
        assert_eq!(*fired.lock(), vec![DisconnectReason::AloneInChannel]);

        thread::sleep(Duration::from_millis(300));
        assert_eq!(
            *fired.lock(),
            vec![DisconnectReason::AloneInChannel, DisconnectReason::NotPlaying]
        );
    }

    #[test]
    fn shutdown_drops_pending_deadlines() {
        let (policy, fired) = recording_policy(Duration::from_millis(20));
        policy.arm(DisconnectReason::NotPlaying, None).unwrap();
        policy.shutdown();

        thread::sleep(Duration::from_millis(100));
        assert!(fired.lock().is_empty());
    }
}
