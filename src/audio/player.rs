use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

use crate::audio::idle::{DisconnectReason, IdlePolicy};
use crate::audio::queue::{Lane, MusicQueue};
use crate::audio::signal::{Generation, Signal};
use crate::audio::source::{FrameSource, SourceOpener};
use crate::audio::transport::{Participant, Transport};
use crate::error::{MusicError, MusicResult};
use crate::sources::PlayableItem;

/// Intervalo máximo de cada espera por la conexión de voz.
const CONNECT_POLL: Duration = Duration::from_millis(250);

/// Qué hacer tras un error de stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorAction {
    /// Pasa a la siguiente canción de la cola.
    Continue,
    /// Deja el reproductor inactivo hasta el próximo `play()`.
    Halt,
}

pub type ErrorHandler = Arc<dyn Fn(&MusicError) -> ErrorAction + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerState {
    Idle,
    Running,
    Paused,
    DrainingPriority,
    StoppedPendingNext,
    Faulted,
    Closed,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerState::Idle => "inactivo",
            PlayerState::Running => "reproduciendo",
            PlayerState::Paused => "en pausa",
            PlayerState::DrainingPriority => "reproduciendo tema de bienvenida",
            PlayerState::StoppedPendingNext => "saltando",
            PlayerState::Faulted => "con error",
            PlayerState::Closed => "desconectado",
        };
        f.write_str(name)
    }
}

impl PlayerState {
    fn for_lane(lane: Lane) -> Self {
        match lane {
            Lane::Priority => PlayerState::DrainingPriority,
            Lane::Main => PlayerState::Running,
        }
    }
}

pub struct PlayerOptions {
    pub idle_timeout: Duration,
    pub on_error: Option<ErrorHandler>,
}

impl Default for PlayerOptions {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(60),
            on_error: None,
        }
    }
}

/// Marca de tiempo fija para enviar un frame cada `frame` sin acumular deriva.
#[derive(Debug)]
pub struct FrameClock {
    frame: Duration,
    start: Instant,
    loops: u32,
}

impl FrameClock {
    pub fn new(frame: Duration) -> Self {
        Self {
            frame,
            start: Instant::now(),
            loops: 0,
        }
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
        self.loops = 0;
    }

    /// Cuenta un frame enviado y devuelve el instante en que toca el siguiente.
    pub fn advance(&mut self) -> Instant {
        self.loops += 1;
        self.start + self.frame * self.loops
    }

    /// Avanza y duerme hasta el siguiente plazo (nunca un tiempo negativo).
    pub fn tick(&mut self) {
        let deadline = self.advance();
        let delay = deadline.saturating_duration_since(Instant::now());
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Señales del hilo de reproducción. Cada una tiene un único lado que la
/// activa y un único lado que espera.
struct Signals {
    /// `play()` la activa; el hilo espera en ella cuando la cola se agota.
    active: Signal,
    /// `resume()`/`stop()` la activan; el hilo espera en ella durante la pausa.
    resumed: Signal,
    /// `stop()` la activa; el hilo la consulta en cada frame.
    end: Signal,
    /// El hilo la incrementa al sacar una entrada de la cola, al quedarse
    /// sin canción y al terminar; `stop(true)` espera a que cambie.
    transitions: Generation,
}

/// Reproductor de una sesión de voz.
///
/// Un hilo dedicado saca canciones de la cola, abre su fuente de frames y
/// los envía al transporte con ritmo fijo. Los comandos del bot sólo
/// modifican la cola y las señales.
pub struct Player {
    queue: Mutex<MusicQueue<PlayableItem>>,
    transport: Arc<dyn Transport>,
    opener: Arc<dyn SourceOpener>,
    idle: IdlePolicy,
    on_error: Option<ErrorHandler>,
    signals: Signals,
    state: Mutex<PlayerState>,
    now_playing: Mutex<Option<(PlayableItem, Lane)>>,
    fault: Mutex<Option<MusicError>>,
    closed: AtomicBool,
    reset_clock: AtomicBool,
    worker: Mutex<Option<JoinHandle<()>>>,
    me: Weak<Player>,
}

impl Player {
    pub fn new(
        transport: Arc<dyn Transport>,
        opener: Arc<dyn SourceOpener>,
        options: PlayerOptions,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me: &Weak<Player>| {
            let session = me.clone();
            let idle = IdlePolicy::new(
                options.idle_timeout,
                Arc::new(move |reason: DisconnectReason| {
                    if let Some(player) = session.upgrade() {
                        info!("💤 Desconectando por {}", reason);
                        player.leave();
                    }
                }),
            );

            Self {
                queue: Mutex::new(MusicQueue::new()),
                transport,
                opener,
                idle,
                on_error: options.on_error,
                signals: Signals {
                    active: Signal::new(false),
                    resumed: Signal::new(true),
                    end: Signal::new(false),
                    transitions: Generation::new(),
                },
                state: Mutex::new(PlayerState::Idle),
                now_playing: Mutex::new(None),
                fault: Mutex::new(None),
                closed: AtomicBool::new(false),
                reset_clock: AtomicBool::new(false),
                worker: Mutex::new(None),
                me: me.clone(),
            }
        })
    }

    /// Empieza (o retoma) el consumo de la cola.
    pub fn play(&self) -> MusicResult<()> {
        if self.is_closed() {
            return Err(MusicError::Disconnected);
        }
        self.idle.disarm(DisconnectReason::NotPlaying);
        self.signals.active.set();
        self.ensure_worker()
    }

    fn ensure_worker(&self) -> MusicResult<()> {
        let mut worker = self.worker.lock();
        if worker.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return Ok(());
        }

        let player = self.me.upgrade().ok_or(MusicError::Disconnected)?;
        let handle = thread::Builder::new()
            .name("zemo-player".into())
            .spawn(move || player.run())?;
        *worker = Some(handle);
        debug!("🎧 Hilo de reproducción iniciado");
        Ok(())
    }

    pub fn pause(&self) {
        self.signals.resumed.clear();
        {
            let mut state = self.state.lock();
            if matches!(*state, PlayerState::Running | PlayerState::DrainingPriority) {
                *state = PlayerState::Paused;
            }
        }
        self.speaking(false);
        info!("⏸️ Reproducción pausada");
    }

    pub fn resume(&self) {
        self.reset_clock.store(true, Ordering::SeqCst);
        self.signals.resumed.set();
        let lane = self.now_playing.lock().as_ref().map(|(_, lane)| *lane);
        {
            let mut state = self.state.lock();
            if *state == PlayerState::Paused {
                *state = lane.map_or(PlayerState::Idle, PlayerState::for_lane);
            }
        }
        self.speaking(true);
        info!("▶️ Reproducción reanudada");
    }

    /// Corta la canción actual; el hilo pasa a la siguiente de la cola.
    ///
    /// Con `blocking` espera a que el hilo haya hecho la transición.
    pub fn stop(&self, blocking: bool) {
        // Se lee antes de mirar `now_playing`: una transición posterior no se pierde.
        let seen = self.signals.transitions.current();
        let wait = blocking && self.worker_alive() && self.now_playing.lock().is_some();
        if wait {
            let mut state = self.state.lock();
            if matches!(
                *state,
                PlayerState::Running | PlayerState::DrainingPriority | PlayerState::Paused
            ) {
                *state = PlayerState::StoppedPendingNext;
            }
        }
        self.signals.end.set();
        self.signals.resumed.set();
        self.speaking(false);
        if wait {
            self.signals.transitions.wait_past(seen);
        }
    }

    /// Cierra la sesión. Llamadas repetidas no hacen nada.
    pub fn leave(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("👋 Saliendo del canal de voz");

        self.idle.disarm_all();
        self.idle.shutdown();
        self.set_state(PlayerState::Closed);

        self.signals.active.set();
        self.signals.resumed.set();
        self.signals.end.set();
        self.signals.transitions.bump();

        self.transport.disconnect();
    }

    /// Reevalúa quién está en el canal tras un cambio de estado de voz.
    pub fn on_membership_change(&self) {
        if self.is_closed() {
            return;
        }

        let members = self.transport.members();
        if members.iter().any(Participant::is_human) {
            self.idle.disarm(DisconnectReason::AloneInChannel);
            return;
        }

        if self.idle.is_armed(DisconnectReason::AloneInChannel) {
            return;
        }
        match self.idle.arm(DisconnectReason::AloneInChannel, None) {
            Ok(()) => info!("🫥 Canal sin oyentes, programando salida"),
            Err(MusicError::AlreadyArmed(_)) => {}
            Err(e) => warn!("No se pudo programar la salida: {}", e),
        }
    }

    pub fn is_playing(&self) -> bool {
        matches!(
            self.state(),
            PlayerState::Running | PlayerState::DrainingPriority
        )
    }

    pub fn is_paused(&self) -> bool {
        !self.signals.resumed.is_set()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> PlayerState {
        *self.state.lock()
    }

    /// Último elemento entregado por la cola.
    pub fn current(&self) -> Option<PlayableItem> {
        self.queue.lock().current().cloned()
    }

    /// Canción que el hilo está enviando ahora mismo.
    pub fn now_playing(&self) -> Option<PlayableItem> {
        self.now_playing.lock().as_ref().map(|(item, _)| item.clone())
    }

    /// Ejecuta `f` con la cola bloqueada.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut MusicQueue<PlayableItem>) -> R) -> R {
        f(&mut self.queue.lock())
    }

    /// Devuelve (y limpia) el error que detuvo el hilo, si lo hubo.
    pub fn take_fault(&self) -> Option<MusicError> {
        self.fault.lock().take()
    }

    fn worker_alive(&self) -> bool {
        self.worker
            .lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    fn set_state(&self, state: PlayerState) {
        *self.state.lock() = state;
    }

    fn speaking(&self, speaking: bool) {
        if let Err(e) = self.transport.set_speaking(speaking) {
            debug!("No se pudo actualizar el indicador de voz: {}", e);
        }
    }

    fn arm_not_playing(&self) {
        match self.idle.arm(DisconnectReason::NotPlaying, None) {
            Ok(()) | Err(MusicError::AlreadyArmed(_)) => {}
            Err(e) => warn!("No se pudo programar la salida: {}", e),
        }
    }

    /// Deja el hilo sin canción hasta el próximo `play()`.
    ///
    /// `active`, `now_playing` y el estado cambian bajo el cerrojo de la cola,
    /// igual que al sacar una entrada.
    fn park(&self, state: PlayerState) {
        {
            let _queue = self.queue.lock();
            self.signals.active.clear();
            *self.now_playing.lock() = None;
            self.set_state(state);
            self.signals.transitions.bump();
        }
        self.settle_idle();
    }

    fn settle_idle(&self) {
        self.speaking(false);
        self.arm_not_playing();
    }

    fn run(self: Arc<Self>) {
        let mut clock = FrameClock::new(self.transport.frame_duration());

        loop {
            self.signals.active.wait();
            if self.is_closed() {
                break;
            }

            // La transición completa ocurre bajo el cerrojo de la cola: un
            // `stop()` posterior corta esta entrada aunque aún se esté abriendo.
            let entry = {
                let mut queue = self.queue.lock();
                let entry = queue.next_entry();
                match &entry {
                    Some((item, lane)) => {
                        self.signals.end.clear();
                        *self.now_playing.lock() = Some((item.clone(), *lane));
                        self.set_state(PlayerState::for_lane(*lane));
                    }
                    None => {
                        self.signals.active.clear();
                        *self.now_playing.lock() = None;
                        self.set_state(PlayerState::Idle);
                    }
                }
                self.signals.transitions.bump();
                entry
            };

            let Some((item, lane)) = entry else {
                debug!("📭 Cola vacía, esperando canciones");
                self.settle_idle();
                continue;
            };

            info!("🎵 Reproduciendo: {}", item.title());

            let outcome = self
                .opener
                .open(&item)
                .and_then(|source| self.stream(source, &item, lane, &mut clock));

            let Err(err) = outcome else {
                continue;
            };

            match self.on_error.as_ref().map(|handler| handler(&err)) {
                Some(ErrorAction::Continue) => {
                    warn!("⚠️ {}; pasando a la siguiente canción", err);
                }
                Some(ErrorAction::Halt) => {
                    warn!("⚠️ {}; reproducción detenida", err);
                    self.park(PlayerState::Idle);
                }
                None => {
                    error!("❌ Error fatal en el reproductor: {}", err);
                    *self.fault.lock() = Some(err);
                    self.park(PlayerState::Faulted);
                    return;
                }
            }
        }

        *self.now_playing.lock() = None;
        self.signals.transitions.bump();
        debug!("🎧 Hilo de reproducción terminado");
    }

    fn stream(
        &self,
        mut source: Box<dyn FrameSource>,
        item: &PlayableItem,
        lane: Lane,
        clock: &mut FrameClock,
    ) -> MusicResult<()> {
        let pre_encoded = source.is_opus();
        self.speaking(true);
        clock.reset();

        loop {
            if self.is_closed() || self.signals.end.is_set() {
                return Ok(());
            }

            if !self.signals.resumed.is_set() {
                self.set_state(PlayerState::Paused);
                self.signals.resumed.wait();
                if !self.is_closed() && !self.signals.end.is_set() {
                    self.set_state(PlayerState::for_lane(lane));
                }
                clock.reset();
                continue;
            }

            if !self.transport.is_connected() {
                debug!("🔌 Esperando conexión de voz");
                while !self.transport.wait_for_connection(CONNECT_POLL) {
                    if self.is_closed() || self.signals.end.is_set() {
                        return Ok(());
                    }
                }
                clock.reset();
                continue;
            }

            if self.reset_clock.swap(false, Ordering::SeqCst) {
                clock.reset();
            }

            let frame = source
                .read_frame()
                .map_err(|e| MusicError::stream(item.title(), e))?;
            let Some(frame) = frame.filter(|frame| !frame.is_empty()) else {
                debug!("Fin de: {}", item.title());
                return Ok(());
            };

            if let Err(e) = self.transport.send_frame(&frame, pre_encoded) {
                warn!("Frame descartado: {}", e);
            }
            clock.tick();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::transport::MockTransport;
    use bytes::Bytes;
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;
    use std::io;
    use std::sync::atomic::AtomicUsize;

    struct FakeTransport {
        frames: Mutex<Vec<Bytes>>,
        connected: Signal,
        members: Mutex<Vec<Participant>>,
        disconnects: AtomicUsize,
    }

    impl FakeTransport {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                frames: Mutex::new(Vec::new()),
                connected: Signal::new(true),
                members: Mutex::new(Vec::new()),
                disconnects: AtomicUsize::new(0),
            })
        }

        fn sent(&self) -> Vec<String> {
            self.frames
                .lock()
                .iter()
                .map(|frame| String::from_utf8_lossy(frame).into_owned())
                .collect()
        }

        fn sent_count(&self) -> usize {
            self.frames.lock().len()
        }
    }

    impl Transport for FakeTransport {
        fn send_frame(&self, frame: &[u8], _pre_encoded: bool) -> MusicResult<()> {
            self.frames.lock().push(Bytes::copy_from_slice(frame));
            Ok(())
        }

        fn is_connected(&self) -> bool {
            self.connected.is_set()
        }

        fn wait_for_connection(&self, timeout: Duration) -> bool {
            self.connected.wait_timeout(timeout)
        }

        fn members(&self) -> Vec<Participant> {
            self.members.lock().clone()
        }

        fn set_speaking(&self, _speaking: bool) -> MusicResult<()> {
            Ok(())
        }

        fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }

        fn frame_duration(&self) -> Duration {
            Duration::from_millis(1)
        }
    }

    #[derive(Clone, Copy)]
    enum Script {
        Frames(usize),
        SlowOpen(Duration, usize),
        FailOpen,
        FailAfter(usize),
    }

    struct ScriptedSource {
        tag: Bytes,
        remaining: usize,
        fail_at_end: bool,
    }

    impl FrameSource for ScriptedSource {
        fn read_frame(&mut self) -> io::Result<Option<Bytes>> {
            if self.remaining == 0 {
                if self.fail_at_end {
                    return Err(io::Error::new(io::ErrorKind::BrokenPipe, "stream cortado"));
                }
                return Ok(None);
            }
            self.remaining -= 1;
            Ok(Some(self.tag.clone()))
        }
    }

    #[derive(Default)]
    struct ScriptedOpener {
        scripts: HashMap<String, Script>,
    }

    impl ScriptedOpener {
        fn with(mut self, title: &str, script: Script) -> Self {
            self.scripts.insert(title.to_string(), script);
            self
        }
    }

    impl SourceOpener for ScriptedOpener {
        fn open(&self, item: &PlayableItem) -> MusicResult<Box<dyn FrameSource>> {
            let script = self
                .scripts
                .get(item.title())
                .copied()
                .unwrap_or(Script::Frames(1));
            let (remaining, fail_at_end) = match script {
                Script::Frames(n) => (n, false),
                Script::SlowOpen(delay, n) => {
                    thread::sleep(delay);
                    (n, false)
                }
                Script::FailAfter(n) => (n, true),
                Script::FailOpen => {
                    return Err(MusicError::stream(
                        item.title(),
                        io::Error::new(io::ErrorKind::NotFound, "sin stream"),
                    ))
                }
            };
            Ok(Box::new(ScriptedSource {
                tag: Bytes::copy_from_slice(item.title().as_bytes()),
                remaining,
                fail_at_end,
            }))
        }
    }

    fn song(title: &str) -> PlayableItem {
        PlayableItem::new(
            title,
            "Autor",
            "https://example.com/thumb.jpg",
            format!("https://example.com/watch/{title}"),
            format!("https://example.com/audio/{title}"),
            180,
        )
    }

    fn options(idle_timeout: Duration, on_error: Option<ErrorHandler>) -> PlayerOptions {
        PlayerOptions {
            idle_timeout,
            on_error,
        }
    }

    fn player_with(
        transport: &Arc<FakeTransport>,
        opener: ScriptedOpener,
        options: PlayerOptions,
    ) -> Arc<Player> {
        Player::new(transport.clone(), Arc::new(opener), options)
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(2));
        }
        condition()
    }

    #[test]
    fn frame_clock_deadlines_do_not_drift() {
        let mut clock = FrameClock::new(Duration::from_millis(20));
        let start = clock.start;

        assert_eq!(clock.advance(), start + Duration::from_millis(20));
        assert_eq!(clock.advance(), start + Duration::from_millis(40));
        assert_eq!(clock.advance(), start + Duration::from_millis(60));

        clock.reset();
        assert_eq!(clock.advance(), clock.start + Duration::from_millis(20));
    }

    #[test]
    fn plays_queue_in_order_then_goes_idle() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default()
            .with("a", Script::Frames(2))
            .with("b", Script::Frames(1));
        let player = player_with(&transport, opener, options(Duration::from_secs(60), None));

        player.with_queue(|queue| {
            queue.append(song("a"));
            queue.append(song("b"));
        });
        player.play().unwrap();

        assert!(wait_for(|| transport.sent_count() == 3 && player.state() == PlayerState::Idle));
        assert_eq!(transport.sent(), vec!["a", "a", "b"]);
        assert_eq!(player.now_playing(), None);
        assert_eq!(player.current().map(|s| s.title().to_string()), Some("b".into()));
        player.leave();
    }

    #[test]
    fn priority_items_play_before_the_main_list() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        player.with_queue(|queue| {
            queue.append(song("main"));
            queue.append_priority(song("theme"));
        });
        player.play().unwrap();

        assert!(wait_for(|| transport.sent_count() == 2));
        assert_eq!(transport.sent(), vec!["theme", "main"]);
        player.leave();
    }

    #[test]
    fn items_added_after_exhaustion_play_on_next_play() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        player.with_queue(|queue| queue.append(song("a")));
        player.play().unwrap();
        assert!(wait_for(|| player.state() == PlayerState::Idle && transport.sent_count() == 1));

        player.with_queue(|queue| queue.append(song("b")));
        player.play().unwrap();
        assert!(wait_for(|| transport.sent_count() == 2));
        assert_eq!(transport.sent(), vec!["a", "b"]);
        player.leave();
    }

    #[test]
    fn exhausted_session_leaves_after_idle_timeout() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_millis(30), None),
        );

        player.with_queue(|queue| queue.append(song("a")));
        player.play().unwrap();

        assert!(wait_for(|| player.state() == PlayerState::Closed));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
        assert!(matches!(player.play(), Err(MusicError::Disconnected)));
    }

    #[test]
    fn blocking_stop_moves_to_the_next_item() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default()
            .with("long", Script::Frames(100_000))
            .with("next", Script::Frames(1));
        let player = player_with(&transport, opener, options(Duration::from_secs(60), None));

        player.with_queue(|queue| {
            queue.append(song("long"));
            queue.append(song("next"));
        });
        player.play().unwrap();
        assert!(wait_for(|| transport.sent_count() > 0));

        player.stop(true);
        assert_eq!(player.current().map(|s| s.title().to_string()), Some("next".into()));
        assert!(wait_for(|| transport.sent().last().map(String::as_str) == Some("next")));
        assert!(transport.sent_count() < 100_000);
        player.leave();
    }

    #[test]
    fn stop_while_opening_skips_the_item_being_opened() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default()
            .with("slow", Script::SlowOpen(Duration::from_millis(300), 100_000))
            .with("target", Script::Frames(3));
        let player = player_with(&transport, opener, options(Duration::from_secs(60), None));

        player.with_queue(|queue| {
            queue.append(song("slow"));
            queue.append(song("target"));
        });
        player.play().unwrap();
        assert!(wait_for(|| player.now_playing().is_some()));

        player.with_queue(|queue| queue.jump(1)).unwrap();
        player.stop(true);

        assert_eq!(player.current().map(|s| s.title().to_string()), Some("target".into()));
        assert!(wait_for(|| transport.sent_count() == 3));
        assert_eq!(transport.sent(), vec!["target", "target", "target"]);
        player.leave();
    }

    #[test]
    fn blocking_stop_racing_queue_exhaustion_never_hangs() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        for round in 0..50 {
            player.with_queue(|queue| queue.append(song(&format!("r{round}"))));
            player.play().unwrap();

            let (done_tx, done_rx) = std::sync::mpsc::channel();
            let stopping = player.clone();
            thread::spawn(move || {
                stopping.stop(true);
                let _ = done_tx.send(());
            });
            assert!(
                done_rx.recv_timeout(Duration::from_secs(2)).is_ok(),
                "stop(true) bloqueado en la ronda {round}"
            );
        }
        player.leave();
    }

    #[test]
    fn blocking_stop_after_exhaustion_returns_immediately() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        player.with_queue(|queue| queue.append(song("a")));
        player.play().unwrap();
        assert!(wait_for(|| player.state() == PlayerState::Idle && transport.sent_count() == 1));

        let started = Instant::now();
        player.stop(true);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(player.state(), PlayerState::Idle);
        player.leave();
    }

    #[test]
    fn stop_without_a_worker_returns_immediately() {
        let transport = FakeTransport::new();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        player.stop(true);
        assert_eq!(player.state(), PlayerState::Idle);
        player.leave();
    }

    #[test]
    fn pause_holds_frames_until_resume() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default().with("long", Script::Frames(100_000));
        let player = player_with(&transport, opener, options(Duration::from_secs(60), None));

        player.with_queue(|queue| queue.append(song("long")));
        player.play().unwrap();
        assert!(wait_for(|| transport.sent_count() > 0));

        player.pause();
        assert!(player.is_paused());
        assert!(wait_for(|| player.state() == PlayerState::Paused));
        thread::sleep(Duration::from_millis(20));
        let held = transport.sent_count();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.sent_count(), held);

        player.resume();
        assert!(!player.is_paused());
        assert!(wait_for(|| transport.sent_count() > held));
        assert!(player.is_playing());
        player.leave();
    }

    #[test]
    fn waits_for_the_voice_connection() {
        let transport = FakeTransport::new();
        transport.connected.clear();
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_secs(60), None),
        );

        player.with_queue(|queue| queue.append(song("a")));
        player.play().unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(transport.sent_count(), 0);

        transport.connected.set();
        assert!(wait_for(|| transport.sent_count() == 1));
        player.leave();
    }

    #[test]
    fn continue_handler_skips_broken_items() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default()
            .with("broken", Script::FailOpen)
            .with("ok", Script::Frames(1));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let log = seen.clone();
        let handler: ErrorHandler = Arc::new(move |err: &MusicError| {
            log.lock().push(err.to_string());
            ErrorAction::Continue
        });
        let player = player_with(&transport, opener, options(Duration::from_secs(60), Some(handler)));

        player.with_queue(|queue| {
            queue.append(song("broken"));
            queue.append(song("ok"));
        });
        player.play().unwrap();

        assert!(wait_for(|| transport.sent_count() == 1));
        assert_eq!(transport.sent(), vec!["ok"]);
        assert_eq!(seen.lock().len(), 1);
        assert!(seen.lock()[0].contains("broken"));
        player.leave();
    }

    #[test]
    fn halt_handler_sends_the_worker_idle() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default().with("broken", Script::FailAfter(1));
        let handler: ErrorHandler = Arc::new(|_: &MusicError| ErrorAction::Halt);
        let player = player_with(&transport, opener, options(Duration::from_secs(60), Some(handler)));

        player.with_queue(|queue| {
            queue.append(song("broken"));
            queue.append(song("after"));
        });
        player.play().unwrap();

        assert!(wait_for(|| player.state() == PlayerState::Idle && transport.sent_count() == 1));
        thread::sleep(Duration::from_millis(30));
        assert_eq!(transport.sent(), vec!["broken"]);
        assert!(player.take_fault().is_none());

        player.play().unwrap();
        assert!(wait_for(|| transport.sent_count() == 2));
        assert_eq!(transport.sent(), vec!["broken", "after"]);
        player.leave();
    }

    #[test]
    fn unhandled_error_faults_the_session() {
        let transport = FakeTransport::new();
        let opener = ScriptedOpener::default().with("broken", Script::FailOpen);
        let player = player_with(&transport, opener, options(Duration::from_secs(60), None));

        player.with_queue(|queue| {
            queue.append(song("broken"));
            queue.append(song("after"));
        });
        player.play().unwrap();

        assert!(wait_for(|| player.state() == PlayerState::Faulted));
        let fault = player.take_fault();
        assert!(matches!(fault, Some(MusicError::Stream { ref title, .. }) if title == "broken"));
        assert!(player.take_fault().is_none());

        // Un play() explícito vuelve a arrancar el hilo.
        assert!(wait_for(|| !player.worker_alive()));
        player.play().unwrap();
        assert!(wait_for(|| transport.sent_count() == 1));
        assert_eq!(transport.sent(), vec!["after"]);
        player.leave();
    }

    #[test]
    fn alone_in_channel_leaves_after_timeout() {
        let transport = FakeTransport::new();
        *transport.members.lock() = vec![Participant { id: 1, bot: true }];
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_millis(30), None),
        );

        player.on_membership_change();
        player.on_membership_change();

        assert!(wait_for(|| player.is_closed()));
        assert_eq!(transport.disconnects.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn listener_returning_cancels_the_alone_timeout() {
        let transport = FakeTransport::new();
        *transport.members.lock() = vec![Participant { id: 1, bot: true }];
        let player = player_with(
            &transport,
            ScriptedOpener::default(),
            options(Duration::from_millis(60), None),
        );

        player.on_membership_change();
        transport.members.lock().push(Participant { id: 2, bot: false });
        player.on_membership_change();

        thread::sleep(Duration::from_millis(150));
        assert!(!player.is_closed());
        player.leave();
    }

    #[test]
    fn leave_is_idempotent() {
        let mut transport = MockTransport::new();
        transport.expect_disconnect().times(1).return_const(());
        let player = Player::new(
            Arc::new(transport),
            Arc::new(ScriptedOpener::default()),
            PlayerOptions::default(),
        );

        player.leave();
        player.leave();

        assert_eq!(player.state(), PlayerState::Closed);
        assert!(matches!(player.play(), Err(MusicError::Disconnected)));
    }
}
