//! Session Lifecycle
//!
//! The queue worker's state: the connection registry, the current game and
//! the inactivity timer. Every inbound message, timer firing, finished page
//! fetch and admin command arrives here as a [`Mutation`] and is applied one
//! at a time.
//!
//! Timers and background fetches hold only a weak sender to the queue and
//! tag what they enqueue with the [`GameId`] they were started for. When the
//! mutation is finally applied the id is checked again, so a timer armed for
//! a game that has since ended or been replaced does nothing.

use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, Instant};
use tracing::{debug, error, info, instrument, warn};

use crate::core::{now_millis, PageId, Player, WikiPage};
use crate::error::AppError;
use crate::game::wiki::fetch_page;
use crate::game::{GameId, MinesweeperGame, Session, TimerGuard, WikiGame};
use crate::network::auth::{AuthConfig, AuthError};
use crate::network::protocol::{
    AdminCommand, AdminResponse, ClientMessage, MineEvent, MineRequest, ServerMessage,
    WikiConfig, WikiEvent, WikiRequest,
};
use crate::network::queue::{MutationQueue, Mutator};
use crate::network::registry::{ConnectionId, ConnectionRegistry, Outbox};
use crate::oracle::Services;

/// Default time without in-game activity before a session is closed.
pub const DEFAULT_INACTIVITY: Duration = Duration::from_secs(10 * 60);

/// Session lifecycle configuration.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Idle time after which the current game is ended.
    pub inactivity: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            inactivity: DEFAULT_INACTIVITY,
        }
    }
}

/// Work items for the session queue.
#[derive(Debug)]
pub enum Mutation {
    /// A parsed message from a connection.
    Inbound {
        /// Sending connection.
        conn: ConnectionId,
        /// The connection's own outbox, for replies before it holds a seat.
        reply: Outbox,
        /// The message.
        msg: ClientMessage,
    },
    /// A connection closed.
    Disconnect {
        /// Closed connection.
        conn: ConnectionId,
    },
    /// Inactivity timer fired.
    InactivityExpired {
        /// Game the timer was armed for.
        game: GameId,
        /// Arming the timer belongs to; a later re-arm supersedes it.
        epoch: u64,
    },
    /// WikiRace time limit reached.
    WikiTimeLimit {
        /// Game the timer was armed for.
        game: GameId,
    },
    /// WikiRace move interval elapsed.
    WikiInterval {
        /// Game the timer was armed for.
        game: GameId,
    },
    /// A navigation fetch finished.
    PageLoaded {
        /// Game the navigation belongs to.
        game: GameId,
        /// Navigating player.
        player: Player,
        /// Nonce of the navigation.
        nonce: u64,
        /// Fetched page, `None` if missing or unreachable.
        page: Option<WikiPage>,
    },
    /// A navigation fetch failed.
    NavigationFailed {
        /// Game the navigation belongs to.
        game: GameId,
        /// Navigating player.
        player: Player,
        /// Nonce of the navigation.
        nonce: u64,
        /// What went wrong.
        error: AppError,
    },
    /// Out-of-band administrative command.
    Admin {
        /// The command.
        cmd: AdminCommand,
        /// Where to send the result.
        reply: oneshot::Sender<AdminResponse>,
    },
}

/// Navigation fetch to run outside the queue.
struct Fetch {
    game: GameId,
    goal: PageId,
    player: Player,
    nonce: u64,
    name: String,
}

fn mine(msg: MineEvent) -> ServerMessage {
    ServerMessage::Mine { msg }
}

fn wiki(msg: WikiEvent) -> ServerMessage {
    ServerMessage::Wiki { msg }
}

/// What a client sees for a failed request.
fn error_message(err: &AppError) -> ServerMessage {
    ServerMessage::Error {
        message: err.user_message(),
    }
}

/// Owner of the registry and the current game.
pub struct SessionManager {
    config: SessionConfig,
    auth: AuthConfig,
    services: Services,
    registry: ConnectionRegistry,
    session: Session,
    inactivity: Option<TimerGuard>,
    inactivity_epoch: u64,
    queue: mpsc::WeakUnboundedSender<Mutation>,
}

impl SessionManager {
    fn new(
        config: SessionConfig,
        auth: AuthConfig,
        services: Services,
        queue: mpsc::WeakUnboundedSender<Mutation>,
    ) -> Self {
        Self {
            config,
            auth,
            services,
            registry: ConnectionRegistry::new(),
            session: Session::Idle,
            inactivity: None,
            inactivity_epoch: 0,
            queue,
        }
    }

    /// Start the queue worker that owns a fresh manager.
    ///
    /// The worker exits once every returned queue handle is dropped.
    pub fn spawn(
        config: SessionConfig,
        auth: AuthConfig,
        services: Services,
    ) -> (MutationQueue<Mutation>, JoinHandle<SessionManager>) {
        let (queue, rx) = MutationQueue::channel();
        let manager = Self::new(config, auth, services, queue.downgrade());
        let worker = MutationQueue::start(manager, rx);
        (queue, worker)
    }

    /// Current game.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Bound seats.
    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    // =========================================================================
    // LIFECYCLE
    // =========================================================================

    /// Install a new game, ending the current one first.
    pub fn start_session(&mut self, session: Session) {
        if !self.session.is_idle() {
            self.registry.broadcast(ServerMessage::GameEnd);
        }
        self.session = session;
        if let Some(game) = self.session.id() {
            info!(%game, "session started");
        }
        self.arm_inactivity();
    }

    /// Push back the inactivity deadline.
    pub fn touch_activity(&mut self) {
        if !self.session.is_idle() {
            self.arm_inactivity();
        }
    }

    /// End the current game, if any.
    pub fn end_session(&mut self) {
        if self.session.is_idle() {
            return;
        }
        let ended = mem::take(&mut self.session);
        self.inactivity = None;
        if let Some(game) = ended.id() {
            info!(%game, "session ended");
        }
        self.registry.broadcast(ServerMessage::GameEnd);
    }

    fn arm_inactivity(&mut self) {
        let Some(game) = self.session.id() else {
            return;
        };
        self.inactivity_epoch += 1;
        let epoch = self.inactivity_epoch;
        let queue = self.queue.clone();
        let after = self.config.inactivity;
        self.inactivity = Some(TimerGuard::spawn(async move {
            sleep(after).await;
            enqueue_weak(&queue, Mutation::InactivityExpired { game, epoch });
        }));
    }

    // =========================================================================
    // INBOUND MESSAGES
    // =========================================================================

    async fn handle_inbound(
        &mut self,
        conn: ConnectionId,
        reply: &Outbox,
        msg: ClientMessage,
    ) -> Result<(), AppError> {
        match msg {
            ClientMessage::Connect { player, token } => {
                self.connect(conn, reply, player, token.as_deref())
            }
            ClientMessage::CloseGame => {
                self.end_session();
                Ok(())
            }
            ClientMessage::Mine { msg } => {
                let player = self.seat_of(conn)?;
                self.handle_mine(player, msg).await?;
                self.touch_activity();
                Ok(())
            }
            ClientMessage::Wiki { msg } => {
                let player = self.seat_of(conn)?;
                self.handle_wiki(player, msg).await?;
                self.touch_activity();
                Ok(())
            }
        }
    }

    fn seat_of(&self, conn: ConnectionId) -> Result<Player, AppError> {
        self.registry
            .player_of(conn)
            .ok_or_else(|| AppError::domain("no player set"))
    }

    fn connect(
        &mut self,
        conn: ConnectionId,
        reply: &Outbox,
        player: Player,
        token: Option<&str>,
    ) -> Result<(), AppError> {
        match self.auth.check(token) {
            Ok(()) => {}
            Err(AuthError::Missing) => {
                debug!(%conn, "token required");
                let _ = reply.try_send(ServerMessage::NeedToken);
                return Ok(());
            }
            Err(e @ AuthError::Invalid) => {
                warn!(%conn, %player, "rejected token");
                let _ = reply.try_send(ServerMessage::NeedToken);
                return Err(AppError::domain(e.to_string()));
            }
        }

        self.registry
            .register(player, conn, reply.clone())
            .map_err(|e| AppError::domain(e.to_string()))?;
        let _ = reply.try_send(ServerMessage::Connected { player });
        Ok(())
    }

    fn require_both_kiosks(&self) -> Result<(), AppError> {
        if self.registry.len() < 2 {
            return Err(AppError::domain("other kiosk is not connected!"));
        }
        Ok(())
    }

    #[instrument(skip(self, msg))]
    async fn handle_mine(&mut self, player: Player, msg: MineRequest) -> Result<(), AppError> {
        match msg {
            MineRequest::StartGame { size, mine_count } => {
                self.require_both_kiosks()?;
                let game = MinesweeperGame::new(size.0, size.1, mine_count, now_millis())?;
                self.start_session(Session::Mines(game));
                self.registry
                    .broadcast(mine(MineEvent::GameRequest { size, mine_count }));
            }
            MineRequest::Reveal { square, start } => {
                mines_mut(&mut self.session)?
                    .reveal(player, square, start, &self.registry, &self.services)
                    .await?;
            }
            MineRequest::Flag { square } => {
                mines_mut(&mut self.session)?.flag(player, square, &self.registry)?;
            }
            MineRequest::GetTimes { size, page } => {
                let times = self.services.leaderboard.query_page(size, page).await?;
                self.registry.send_to(player, mine(MineEvent::LoadTimes(times)));
            }
            MineRequest::SetTimeName { name } => {
                mines_mut(&mut self.session)?
                    .set_time_name(player, &name, &self.registry, &self.services)
                    .await?;
            }
            MineRequest::AddTime => {
                mines_mut(&mut self.session)?
                    .add_time(player, &self.registry, &self.services)
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self, msg))]
    async fn handle_wiki(&mut self, player: Player, msg: WikiRequest) -> Result<(), AppError> {
        match msg {
            WikiRequest::RequestStartEnd { game } => {
                self.require_both_kiosks()?;
                self.registry.broadcast(wiki(WikiEvent::LoadingStartEnd));
                let game = WikiGame::prepare(game, &self.services, now_millis()).await?;
                let setup = game.setup_event();
                self.start_session(Session::Wiki(game));
                self.registry.broadcast(wiki(setup));
            }
            WikiRequest::StartGame => {
                let game = wiki_mut(&mut self.session)?;
                let start_time = game.start(now_millis())?;
                let timers = wiki_timers(&self.queue, game.id(), game.config());
                game.attach_timers(timers);
                self.registry
                    .broadcast(wiki(WikiEvent::GameStart { start_time }));
            }
            WikiRequest::Goto { name, back, hash } => {
                let game = wiki_mut(&mut self.session)?;
                let nonce = game.begin_navigation(player, name.clone(), back, hash)?;
                self.registry.send_to(player, wiki(WikiEvent::LoadingPage));
                let fetch = Fetch {
                    game: game.id(),
                    goal: game.goal_id(),
                    player,
                    nonce,
                    name,
                };
                spawn_fetch(self.queue.clone(), self.services.clone(), fetch);
            }
            WikiRequest::Stop => {
                wiki_mut(&mut self.session)?.stop(player, &self.registry, now_millis())?;
            }
            WikiRequest::StopLoading => {
                wiki_mut(&mut self.session)?.stop_loading(player);
                self.registry.send_to(player, wiki(WikiEvent::LoadingStopped));
            }
        }
        Ok(())
    }

    // =========================================================================
    // ADMIN
    // =========================================================================

    /// Apply an administrative command.
    pub fn admin(&mut self, cmd: AdminCommand) -> AdminResponse {
        match cmd {
            AdminCommand::Message { msg } => {
                self.registry
                    .broadcast(ServerMessage::DisplayMessage { message: msg });
                AdminResponse::Ok
            }
            AdminCommand::Reset => {
                info!("admin reset");
                self.registry.broadcast(ServerMessage::Reset);
                AdminResponse::Ok
            }
            AdminCommand::Status => AdminResponse::Status {
                players: self.registry.players(),
                game: self.session.status(),
            },
        }
    }
}

impl SessionManager {
    async fn dispatch(&mut self, mutation: Mutation) -> Result<(), AppError> {
        match mutation {
            Mutation::Inbound { conn, reply, msg } => {
                let result = self.handle_inbound(conn, &reply, msg).await;
                if let Err(e) = &result {
                    if matches!(e, AppError::Internal(_)) {
                        error!(%conn, error = %e, "internal error");
                    }
                    let _ = reply.try_send(error_message(e));
                }
                result
            }
            Mutation::Disconnect { conn } => {
                // The game keeps running; the seat can be taken again.
                self.registry.unregister(conn);
                Ok(())
            }
            Mutation::InactivityExpired { game, epoch } => {
                if self.session.id() != Some(game) {
                    return Ok(());
                }
                if epoch != self.inactivity_epoch {
                    debug!(%game, epoch, "superseded inactivity timer ignored");
                    return Ok(());
                }
                info!(%game, "game inactive");
                self.end_session();
                Ok(())
            }
            Mutation::WikiTimeLimit { game } => {
                if let Some(wiki) = current_wiki(&mut self.session, game) {
                    debug!(%game, "time limit reached");
                    wiki.time_limit_expired(&self.registry, now_millis());
                }
                Ok(())
            }
            Mutation::WikiInterval { game } => {
                if let Some(wiki) = current_wiki(&mut self.session, game) {
                    debug!(%game, "move interval elapsed");
                    wiki.interval_elapsed(&self.registry, now_millis());
                }
                Ok(())
            }
            Mutation::PageLoaded {
                game,
                player,
                nonce,
                page,
            } => {
                match current_wiki(&mut self.session, game) {
                    Some(wiki) => {
                        wiki.complete_navigation(player, nonce, page, &self.registry, now_millis());
                    }
                    None => debug!(%game, "page for a finished game dropped"),
                }
                Ok(())
            }
            Mutation::NavigationFailed {
                game,
                player,
                nonce,
                error,
            } => {
                let Some(race) = current_wiki(&mut self.session, game) else {
                    return Ok(());
                };
                if race.fail_navigation(player, nonce) {
                    self.registry.send_to(player, error_message(&error));
                    self.registry.send_to(player, wiki(WikiEvent::LoadingStopped));
                    return Err(error);
                }
                Ok(())
            }
            Mutation::Admin { cmd, reply } => {
                let response = self.admin(cmd);
                let _ = reply.send(response);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl Mutator for SessionManager {
    type Mutation = Mutation;

    async fn apply(&mut self, mutation: Mutation) -> Result<(), AppError> {
        let result = self.dispatch(mutation).await;
        self.registry.release_stalled();
        result
    }

    fn label(mutation: &Mutation) -> &'static str {
        match mutation {
            Mutation::Inbound { .. } => "inbound",
            Mutation::Disconnect { .. } => "disconnect",
            Mutation::InactivityExpired { .. } => "inactivity",
            Mutation::WikiTimeLimit { .. } => "wiki-time-limit",
            Mutation::WikiInterval { .. } => "wiki-interval",
            Mutation::PageLoaded { .. } => "page-loaded",
            Mutation::NavigationFailed { .. } => "navigation-failed",
            Mutation::Admin { .. } => "admin",
        }
    }
}

fn mines_mut(session: &mut Session) -> Result<&mut MinesweeperGame, AppError> {
    match session {
        Session::Mines(game) => Ok(game),
        _ => Err(AppError::domain("no active game")),
    }
}

fn wiki_mut(session: &mut Session) -> Result<&mut WikiGame, AppError> {
    match session {
        Session::Wiki(game) => Ok(game),
        _ => Err(AppError::domain("Invalid state")),
    }
}

/// The WikiRace game `id`, if it is still the current one.
fn current_wiki(session: &mut Session, id: GameId) -> Option<&mut WikiGame> {
    match session {
        Session::Wiki(game) if game.id() == id => Some(game),
        _ => None,
    }
}

/// Enqueue through a weak handle. Returns `false` once the queue is gone.
fn enqueue_weak(queue: &mpsc::WeakUnboundedSender<Mutation>, mutation: Mutation) -> bool {
    match queue.upgrade() {
        Some(tx) => tx.send(mutation).is_ok(),
        None => false,
    }
}

/// Arm the time-limit and move-interval timers of a started race.
fn wiki_timers(
    queue: &mpsc::WeakUnboundedSender<Mutation>,
    game: GameId,
    config: &WikiConfig,
) -> Vec<TimerGuard> {
    let mut timers = Vec::new();

    if let Some(limit) = config.time_limit {
        let queue = queue.clone();
        timers.push(TimerGuard::spawn(async move {
            sleep(Duration::from_secs(limit)).await;
            enqueue_weak(&queue, Mutation::WikiTimeLimit { game });
        }));
    }

    if let Some(secs) = config.time_interval {
        let queue = queue.clone();
        let period = Duration::from_secs(secs);
        timers.push(TimerGuard::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            loop {
                ticker.tick().await;
                if !enqueue_weak(&queue, Mutation::WikiInterval { game }) {
                    break;
                }
            }
        }));
    }

    timers
}

/// Fetch a page outside the queue and feed the result back in.
fn spawn_fetch(queue: mpsc::WeakUnboundedSender<Mutation>, services: Services, fetch: Fetch) {
    tokio::spawn(async move {
        let Fetch {
            game,
            goal,
            player,
            nonce,
            name,
        } = fetch;
        let mutation = match fetch_page(&services, &name, goal).await {
            Ok(page) => Mutation::PageLoaded {
                game,
                player,
                nonce,
                page,
            },
            Err(e) => {
                warn!(%player, %name, error = %e, "page fetch failed");
                Mutation::NavigationFailed {
                    game,
                    player,
                    nonce,
                    error: e.into(),
                }
            }
        };
        if !enqueue_weak(&queue, mutation) {
            debug!("queue closed before page arrived");
        }
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::race::EndReason;
    use crate::core::{Board, Square, WinReason};
    use crate::game::MinePhase;
    use crate::network::protocol::GameKind;
    use crate::network::registry::{drain, outbox};
    use crate::oracle::testing::{services, FakeWiki, ScriptedBoards};
    use std::net::SocketAddr;
    use std::sync::Arc;

    struct Kiosk {
        conn: ConnectionId,
        tx: Outbox,
        rx: mpsc::Receiver<ServerMessage>,
    }

    impl Kiosk {
        fn new(port: u16) -> Self {
            let (tx, rx) = outbox();
            Self {
                conn: SocketAddr::from(([127, 0, 0, 1], port)),
                tx,
                rx,
            }
        }

        fn says(&self, msg: ClientMessage) -> Mutation {
            Mutation::Inbound {
                conn: self.conn,
                reply: self.tx.clone(),
                msg,
            }
        }

        fn mine(&self, msg: MineRequest) -> Mutation {
            self.says(ClientMessage::Mine { msg })
        }

        fn wiki(&self, msg: WikiRequest) -> Mutation {
            self.says(ClientMessage::Wiki { msg })
        }

        fn inbox(&mut self) -> Vec<ServerMessage> {
            drain(&mut self.rx)
        }
    }

    fn connect(player: Player) -> ClientMessage {
        ClientMessage::Connect { player, token: None }
    }

    /// Manager driven by hand, with its follow-up mutations collected.
    struct Harness {
        manager: SessionManager,
        _queue: MutationQueue<Mutation>,
        followups: mpsc::UnboundedReceiver<Mutation>,
        one: Kiosk,
        two: Kiosk,
    }

    impl Harness {
        fn new(boards: Arc<ScriptedBoards>, wiki: Arc<FakeWiki>, auth: AuthConfig) -> Self {
            let (queue, followups) = MutationQueue::channel();
            let manager = SessionManager::new(
                SessionConfig::default(),
                auth,
                services(boards, wiki),
                queue.downgrade(),
            );
            Self {
                manager,
                _queue: queue,
                followups,
                one: Kiosk::new(9101),
                two: Kiosk::new(9102),
            }
        }

        async fn seated(boards: Arc<ScriptedBoards>, wiki: Arc<FakeWiki>) -> Self {
            let mut harness = Self::new(boards, wiki, AuthConfig::default());
            let m = harness.one.says(connect(Player::One));
            harness.apply(m).await;
            let m = harness.two.says(connect(Player::Two));
            harness.apply(m).await;
            harness.one.inbox();
            harness.two.inbox();
            harness
        }

        async fn apply(&mut self, mutation: Mutation) {
            let _ = self.manager.apply(mutation).await;
        }

        /// Apply the next mutation a timer or fetch enqueued.
        async fn follow_up(&mut self) {
            let mutation = self.followups.recv().await.unwrap();
            self.apply(mutation).await;
        }

        fn mines(&self) -> &MinesweeperGame {
            match self.manager.session() {
                Session::Mines(game) => game,
                _ => panic!("no minesweeper game"),
            }
        }

        fn wiki(&self) -> &WikiGame {
            match self.manager.session() {
                Session::Wiki(game) => game,
                _ => panic!("no wiki game"),
            }
        }
    }

    fn err(message: &str) -> ServerMessage {
        ServerMessage::error(message)
    }

    // Ten mines on the rim and near corners; (4,4) is a zero.
    fn scenario_mines() -> Vec<Square> {
        vec![
            (0, 0), (0, 4), (0, 8), (1, 1), (4, 0),
            (4, 8), (7, 7), (8, 0), (8, 4), (8, 8),
        ]
    }

    #[tokio::test]
    async fn test_connect_rules() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::new(boards, Arc::new(FakeWiki::default()), AuthConfig::with_password("pw"));

        let m = h.one.says(connect(Player::One));
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![ServerMessage::NeedToken]);

        let m = h.one.says(ClientMessage::Connect { player: Player::One, token: Some("nope".into()) });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![ServerMessage::NeedToken, err("invalid token")]);

        let m = h.one.says(ClientMessage::Connect { player: Player::One, token: Some("pw".into()) });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![ServerMessage::Connected { player: Player::One }]);

        let m = h.one.says(ClientMessage::Connect { player: Player::Two, token: Some("pw".into()) });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("already set a player")]);

        let m = h.two.says(ClientMessage::Connect { player: Player::One, token: Some("pw".into()) });
        h.apply(m).await;
        assert_eq!(h.two.inbox(), vec![err("player already in use")]);
    }

    #[tokio::test]
    async fn test_game_messages_need_a_seat_and_a_game() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::new(boards, Arc::new(FakeWiki::default()), AuthConfig::default());

        let m = h.one.mine(MineRequest::Flag { square: (0, 0) });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("no player set")]);

        let m = h.one.says(connect(Player::One));
        h.apply(m).await;
        h.one.inbox();

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("other kiosk is not connected!")]);

        let m = h.one.mine(MineRequest::Flag { square: (0, 0) });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("no active game")]);

        let m = h.one.wiki(WikiRequest::Stop);
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("Invalid state")]);
        assert!(h.manager.session().is_idle());
    }

    #[tokio::test]
    async fn test_minesweeper_opening_and_mine_hit() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        let request = mine(MineEvent::GameRequest { size: (9, 9), mine_count: 10 });
        assert_eq!(h.one.inbox(), vec![request.clone()]);
        assert_eq!(h.two.inbox(), vec![request]);

        let m = h.one.mine(MineRequest::Reveal { square: (4, 4), start: true });
        h.apply(m).await;
        let start = h.two.inbox();
        assert_eq!(start.len(), 1);
        let ServerMessage::Mine { msg: MineEvent::GameStart { game } } = &start[0] else {
            panic!("expected gameStart, got {start:?}");
        };
        assert_eq!(game.start_square, (4, 4));
        let layout_mines: usize = game.board.iter().flatten().filter(|m| **m).count();
        assert_eq!(layout_mines, 10);
        h.one.inbox();

        let board = h.mines().board().unwrap();
        for square in [(4, 4), (3, 3), (5, 5), (2, 4)] {
            assert_eq!(board.cell(square).unwrap().revealed, [true, true], "{square:?}");
        }
        assert!(board.mine_count() == 10);

        let m = h.one.mine(MineRequest::Reveal { square: (1, 1), start: false });
        h.apply(m).await;
        let board = h.mines().board().unwrap();
        assert_eq!(board.deaths(Player::One), 1);
        assert_eq!(board.cell((1, 1)).unwrap().revealed, [true, true]);
        assert_eq!(h.mines().phase(), MinePhase::Ongoing);
        assert!(matches!(
            h.two.inbox().as_slice(),
            [ServerMessage::Mine { msg: MineEvent::PlayerReveal { player: Player::One, square: (1, 1), .. } }]
        ));
    }

    #[tokio::test]
    async fn test_death_limit_ends_game() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.two.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        let m = h.two.mine(MineRequest::Reveal { square: (4, 4), start: true });
        h.apply(m).await;
        for square in [(1, 1), (7, 7)] {
            let m = h.two.mine(MineRequest::Reveal { square, start: false });
            h.apply(m).await;
        }

        let MinePhase::Finished(outcome) = h.mines().phase() else {
            panic!("game should be over");
        };
        assert_eq!(outcome.winner, Player::One);
        assert_eq!(outcome.reason, WinReason::Death);

        h.one.inbox();
        let m = h.one.mine(MineRequest::Reveal { square: (2, 2), start: false });
        h.apply(m).await;
        assert_eq!(h.one.inbox(), vec![err("game is over")]);
    }

    #[tokio::test]
    async fn test_concurrent_openings_are_serialized() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let wiki = Arc::new(FakeWiki::default());
        let (queue, worker) = SessionManager::spawn(
            SessionConfig::default(),
            AuthConfig::default(),
            services(boards.clone(), wiki),
        );
        let mut one = Kiosk::new(9201);
        let mut two = Kiosk::new(9202);

        queue.enqueue(one.says(connect(Player::One)));
        queue.enqueue(two.says(connect(Player::Two)));
        queue.enqueue(one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 }));
        // Both kiosks race for the opening click.
        queue.enqueue(one.mine(MineRequest::Reveal { square: (4, 4), start: true }));
        queue.enqueue(two.mine(MineRequest::Reveal { square: (3, 3), start: true }));

        let (reply, status) = oneshot::channel();
        queue.enqueue(Mutation::Admin { cmd: AdminCommand::Status, reply });
        let status = status.await.unwrap();
        assert!(matches!(
            status,
            AdminResponse::Status { ref players, game: Some(ref game) }
                if players.len() == 2 && game.kind == GameKind::Mine
        ));

        assert_eq!(boards.calls(), 1);
        for kiosk in [&mut one, &mut two] {
            let starts = kiosk
                .inbox()
                .into_iter()
                .filter(|m| matches!(m, ServerMessage::Mine { msg: MineEvent::GameStart { .. } }))
                .count();
            assert_eq!(starts, 1);
        }

        drop(queue);
        let manager = worker.await.unwrap();
        match manager.session() {
            Session::Mines(game) => assert_eq!(game.start_square(), Some((4, 4))),
            _ => panic!("expected a minesweeper game"),
        }
    }

    #[tokio::test]
    async fn test_interleaved_actions_replay_onto_board() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let (queue, worker) = SessionManager::spawn(
            SessionConfig::default(),
            AuthConfig::default(),
            services(boards, Arc::new(FakeWiki::default())),
        );
        let one = Kiosk::new(9301);
        let mut two = Kiosk::new(9302);

        queue.enqueue(one.says(connect(Player::One)));
        queue.enqueue(two.says(connect(Player::Two)));
        queue.enqueue(one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 }));
        queue.enqueue(one.mine(MineRequest::Reveal { square: (4, 4), start: true }));

        // One works safe cells and flags; Two walks into mines and keeps going.
        let one_actions = vec![
            one.mine(MineRequest::Reveal { square: (0, 2), start: false }),
            one.mine(MineRequest::Flag { square: (0, 0) }),
            one.mine(MineRequest::Reveal { square: (5, 8), start: false }),
            one.mine(MineRequest::Reveal { square: (8, 6), start: false }),
            one.mine(MineRequest::Flag { square: (4, 8) }),
            one.mine(MineRequest::Reveal { square: (2, 0), start: false }),
        ];
        let two_actions = vec![
            two.mine(MineRequest::Reveal { square: (1, 1), start: false }),
            two.mine(MineRequest::Flag { square: (8, 8) }),
            two.mine(MineRequest::Reveal { square: (7, 7), start: false }),
            two.mine(MineRequest::Reveal { square: (0, 0), start: false }),
        ];
        let senders: Vec<_> = [one_actions, two_actions]
            .into_iter()
            .map(|actions| {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for mutation in actions {
                        queue.enqueue(mutation);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();
        for sender in senders {
            sender.await.unwrap();
        }

        let (reply, status) = oneshot::channel();
        queue.enqueue(Mutation::Admin { cmd: AdminCommand::Status, reply });
        status.await.unwrap();
        drop(queue);
        let manager = worker.await.unwrap();
        let Session::Mines(game) = manager.session() else {
            panic!("expected a minesweeper game");
        };

        let mut replay = Board::from_mines(9, 9, &scenario_mines()).unwrap();
        replay.open((4, 4)).unwrap();
        let seen = two.inbox();
        let mut after_outcome = 0;
        for msg in seen.iter().cloned() {
            let ServerMessage::Mine { msg } = msg else { continue };
            if replay.outcome().is_some() && matches!(msg, MineEvent::PlayerReveal { .. } | MineEvent::PlayerFlag { .. }) {
                after_outcome += 1;
            }
            match msg {
                MineEvent::PlayerReveal { player, square, .. } => {
                    replay.reveal(player, square).unwrap();
                }
                MineEvent::PlayerFlag { player, square, .. } => {
                    replay.flag(player, square).unwrap();
                }
                _ => {}
            }
        }

        assert_eq!(after_outcome, 0);
        assert_eq!(game.board(), Some(&replay));
        assert_eq!(replay.deaths(Player::Two), 2);
        assert_eq!(replay.deaths(Player::One), 0);
        let MinePhase::Finished(outcome) = game.phase() else {
            panic!("two deaths should end the game");
        };
        assert_eq!((outcome.winner, outcome.reason), (Player::One, WinReason::Death));
        // Two's last click came after its second death.
        assert!(seen.contains(&err("game is over")));
    }

    #[tokio::test]
    async fn test_wiki_only_closer_scenario() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        let config = WikiConfig { only_closer: true, ..Default::default() };
        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: config });
        h.apply(m).await;
        let inbox = h.two.inbox();
        assert_eq!(inbox.len(), 2);
        assert_eq!(inbox[0], wiki(WikiEvent::LoadingStartEnd));
        assert!(matches!(&inbox[1], ServerMessage::Wiki { msg: WikiEvent::SetStartEnd { .. } }));

        let m = h.one.wiki(WikiRequest::StartGame);
        h.apply(m).await;
        h.one.inbox();
        h.two.inbox();

        let m = h.two.wiki(WikiRequest::Goto { name: "Far".into(), back: false, hash: None });
        h.apply(m).await;
        assert_eq!(h.two.inbox(), vec![wiki(WikiEvent::LoadingPage)]);

        h.follow_up().await;
        let last = h.one.inbox().pop();
        assert!(matches!(
            last,
            Some(ServerMessage::Wiki { msg: WikiEvent::Stopped {
                why: EndReason::Died,
                player: Some(Player::Two),
                winner: Some(Player::One),
                ..
            } })
        ));
    }

    #[tokio::test]
    async fn test_stale_navigation_is_discarded() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let wiki_graph = FakeWiki::sample().slow("Alpha", Duration::from_millis(50));
        let mut h = Harness::seated(boards, Arc::new(wiki_graph)).await;

        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: WikiConfig::default() });
        h.apply(m).await;
        let m = h.one.wiki(WikiRequest::StartGame);
        h.apply(m).await;
        h.one.inbox();

        let m = h.one.wiki(WikiRequest::Goto { name: "Alpha".into(), back: false, hash: None });
        h.apply(m).await;
        let m = h.one.wiki(WikiRequest::Goto { name: "Beta".into(), back: false, hash: None });
        h.apply(m).await;

        // Beta lands first, then the slow Alpha result arrives stale.
        h.follow_up().await;
        h.follow_up().await;

        let contents: Vec<_> = h
            .one
            .inbox()
            .into_iter()
            .filter_map(|m| match m {
                ServerMessage::Wiki { msg: WikiEvent::PageContent { page: Some(page), .. } } => Some(page.name),
                _ => None,
            })
            .collect();
        assert_eq!(contents, vec!["Beta".to_string()]);
        assert_eq!(h.wiki().racer(Player::One).current(), Some("Beta"));
    }

    #[tokio::test]
    async fn test_navigation_failure_reaches_player() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: WikiConfig::default() });
        h.apply(m).await;
        let m = h.one.wiki(WikiRequest::StartGame);
        h.apply(m).await;
        h.one.inbox();

        let m = h.one.wiki(WikiRequest::Goto { name: "Broken".into(), back: false, hash: None });
        h.apply(m).await;
        h.follow_up().await;
        assert_eq!(
            h.one.inbox(),
            vec![
                wiki(WikiEvent::LoadingPage),
                err("upstream timeout"),
                wiki(WikiEvent::LoadingStopped),
            ]
        );
        assert!(!h.wiki().is_loading(Player::One));

        // A failure for a navigation that is no longer pending says nothing.
        let game = h.wiki().id();
        h.apply(Mutation::NavigationFailed {
            game,
            player: Player::One,
            nonce: 999,
            error: AppError::domain("late failure"),
        })
        .await;
        assert!(h.one.inbox().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_timers_are_rejected() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        let config = WikiConfig { time_interval: Some(u64::MAX), ..Default::default() };
        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: config });
        h.apply(m).await;
        assert_eq!(
            h.one.inbox(),
            vec![wiki(WikiEvent::LoadingStartEnd), err("Time limits must be at most one day")]
        );
        assert!(h.manager.session().is_idle());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_limit_fires_through_queue() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        let config = WikiConfig { time_limit: Some(30), ..Default::default() };
        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: config });
        h.apply(m).await;
        let m = h.one.wiki(WikiRequest::StartGame);
        h.apply(m).await;
        h.two.inbox();

        h.follow_up().await;
        assert_eq!(h.wiki().phase(), crate::game::WikiPhase::Ended(EndReason::Timeout));
        assert!(matches!(
            h.two.inbox().as_slice(),
            [ServerMessage::Wiki { msg: WikiEvent::Stopped { why: EndReason::Timeout, winner: None, .. } }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_without_moves_ends_race() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        let config = WikiConfig { time_interval: Some(10), ..Default::default() };
        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: config });
        h.apply(m).await;
        let m = h.one.wiki(WikiRequest::StartGame);
        h.apply(m).await;
        h.one.inbox();

        h.follow_up().await;
        assert!(matches!(
            h.one.inbox().as_slice(),
            [ServerMessage::Wiki { msg: WikiEvent::Stopped { why: EndReason::NoMove, winner: None, .. } }]
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inactivity_closes_session() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        h.one.inbox();
        let started = Instant::now();

        h.follow_up().await;
        assert!(started.elapsed() >= DEFAULT_INACTIVITY);
        assert!(h.manager.session().is_idle());
        assert_eq!(h.one.inbox(), vec![ServerMessage::GameEnd]);
    }

    #[tokio::test]
    async fn test_superseded_inactivity_timer_is_ignored() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        let game = h.manager.session().id().unwrap();
        let armed = h.manager.inactivity_epoch;

        // The expiry is already queued when an accepted action re-arms.
        let m = h.one.mine(MineRequest::Reveal { square: (4, 4), start: true });
        h.apply(m).await;
        assert!(h.manager.inactivity_epoch > armed);
        h.apply(Mutation::InactivityExpired { game, epoch: armed }).await;
        assert!(!h.manager.session().is_idle());

        // Rejected actions do not re-arm.
        let current = h.manager.inactivity_epoch;
        let m = h.one.mine(MineRequest::Reveal { square: (9, 9), start: false });
        h.apply(m).await;
        assert_eq!(h.manager.inactivity_epoch, current);

        h.one.inbox();
        h.apply(Mutation::InactivityExpired { game, epoch: current }).await;
        assert!(h.manager.session().is_idle());
        assert_eq!(h.one.inbox(), vec![ServerMessage::GameEnd]);
    }

    #[tokio::test]
    async fn test_timer_for_replaced_game_is_ignored() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        let first = h.manager.session().id().unwrap();
        let m = h.one.mine(MineRequest::StartGame { size: (5, 5), mine_count: 3 });
        h.apply(m).await;
        assert_eq!(
            h.two.inbox(),
            vec![
                mine(MineEvent::GameRequest { size: (9, 9), mine_count: 10 }),
                ServerMessage::GameEnd,
                mine(MineEvent::GameRequest { size: (5, 5), mine_count: 3 }),
            ]
        );

        let epoch = h.manager.inactivity_epoch;
        h.apply(Mutation::InactivityExpired { game: first, epoch }).await;
        assert!(!h.manager.session().is_idle());
        assert!(h.two.inbox().is_empty());
    }

    #[tokio::test]
    async fn test_close_game_and_disconnect() {
        let boards = Arc::new(ScriptedBoards::new(scenario_mines()));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::default())).await;

        let m = h.one.mine(MineRequest::StartGame { size: (9, 9), mine_count: 10 });
        h.apply(m).await;
        h.apply(Mutation::Disconnect { conn: h.two.conn }).await;
        assert_eq!(h.manager.registry().players(), vec![Player::One]);
        assert!(!h.manager.session().is_idle());

        let m = h.two.says(connect(Player::Two));
        h.apply(m).await;
        assert_eq!(h.manager.registry().len(), 2);
        h.one.inbox();

        let m = h.two.says(ClientMessage::CloseGame);
        h.apply(m).await;
        assert!(h.manager.session().is_idle());
        assert_eq!(h.one.inbox(), vec![ServerMessage::GameEnd]);
    }

    #[tokio::test]
    async fn test_admin_commands() {
        let boards = Arc::new(ScriptedBoards::new(vec![]));
        let mut h = Harness::seated(boards, Arc::new(FakeWiki::sample())).await;

        assert_eq!(
            h.manager.admin(AdminCommand::Message { msg: Some("closing soon".into()) }),
            AdminResponse::Ok
        );
        assert_eq!(h.manager.admin(AdminCommand::Reset), AdminResponse::Ok);
        assert_eq!(
            h.two.inbox(),
            vec![
                ServerMessage::DisplayMessage { message: Some("closing soon".into()) },
                ServerMessage::Reset,
            ]
        );
        assert_eq!(
            h.manager.admin(AdminCommand::Status),
            AdminResponse::Status { players: vec![Player::One, Player::Two], game: None }
        );

        let m = h.one.wiki(WikiRequest::RequestStartEnd { game: WikiConfig::default() });
        h.apply(m).await;
        let AdminResponse::Status { game: Some(status), .. } = h.manager.admin(AdminCommand::Status) else {
            panic!("expected a game");
        };
        assert_eq!(status.kind, GameKind::Wiki);
    }
}
