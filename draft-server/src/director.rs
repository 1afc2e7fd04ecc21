//! The game director: the single serialization point that owns all draft
//! state.
//!
//! Exactly one director task runs per game. Sessions, the round ticker and
//! the HTTP layer never touch game state; they post [`DirectorEvent`]s
//! through a [`DirectorHandle`] and the director applies them one at a time.
//! Every transition (joins, departures, game start, picks, round and pack
//! advancement, host handoff) is therefore a plain sequential mutation.

use indexmap::IndexMap;
use protocol::CHANNEL_BUFFER_SIZE;
use protocol::cards::{CardPack, SetCard};
use protocol::message::{ChooseCardJson, GameMessageType, Message, TimerSettings};
use protocol::timer::RoundTimer;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::config::{GameMode, GameType, GeneralOptions};
use crate::resources::{DraftResources, DraftRound};
use crate::round_ticker;
use crate::session::SessionHandle;

/// How long the director keeps running once the last client is gone.
const HOST_GRACE: Duration = Duration::from_secs(30);

/// Protocol and transport failures reported to the director. None of these
/// are fatal; they get logged and the game carries on.
#[derive(Debug, Error)]
pub enum DirectorError {
    #[error("no client with id {0}, must provide a valid client id")]
    UnknownClient(String),
    #[error("client {0} has no seat in this draft")]
    NotSeated(String),
    #[error("client {0} already chose this round, resent choose_card")]
    AlreadyChose(String),
    #[error("client {client} chose an invalid card index {index}")]
    InvalidCardIndex { client: String, index: i64 },
    #[error("no client is seated at {0}")]
    NoClientAtSeat(usize),
    #[error("no packs loaded for the current pack number")]
    NoActivePack,
    #[error("client {0} is not the host")]
    NotHost(String),
    #[error("malformed message payload: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("session transport failed: {0}")]
    Transport(String),
}

/// The inputs the director multiplexes over. Everything that mutates game
/// state arrives here.
pub enum DirectorEvent {
    AddClient(SessionHandle),
    DeleteClient { id: String, generation: u64 },
    ClientMessage { id: String, msg: Message },
    StartNextRound,
    SendAll(Message),
    Error(DirectorError),
    HostGraceExpired,
    Shutdown,
}

/// A cloneable posting end of the director's event queue.
#[derive(Clone)]
pub struct DirectorHandle {
    events: mpsc::Sender<DirectorEvent>,
}

impl DirectorHandle {
    pub async fn add_client(&self, session: SessionHandle) {
        self.post(DirectorEvent::AddClient(session)).await;
    }

    pub async fn delete_client(&self, id: String, generation: u64) {
        self.post(DirectorEvent::DeleteClient { id, generation }).await;
    }

    pub async fn client_message(&self, id: String, msg: Message) {
        self.post(DirectorEvent::ClientMessage { id, msg }).await;
    }

    pub async fn start_next_round(&self) {
        self.post(DirectorEvent::StartNextRound).await;
    }

    pub async fn send_all(&self, msg: Message) {
        self.post(DirectorEvent::SendAll(msg)).await;
    }

    pub async fn error(&self, err: DirectorError) {
        self.post(DirectorEvent::Error(err)).await;
    }

    pub async fn host_grace_expired(&self) {
        self.post(DirectorEvent::HostGraceExpired).await;
    }

    pub async fn shutdown(&self) {
        self.post(DirectorEvent::Shutdown).await;
    }

    async fn post(&self, event: DirectorEvent) {
        // The director only goes away at end of game; late events are moot.
        let _ = self.events.send(event).await;
    }
}

/// The authoritative state of one draft.
pub struct GameDirector {
    game_id: String,
    options: GeneralOptions,
    game_started: bool,
    /// 0-based index of the pack currently being drafted.
    pack_number: usize,
    /// 1-based round within the current pack.
    round: u32,
    round_timer: Option<RoundTimer>,
    server_force_pick: bool,
    /// Pack number to the packs in front of each seat.
    round_packs: HashMap<usize, DraftRound>,
    /// Seat to the pack that arrives there once the round rotates.
    next_round_packs: HashMap<usize, Vec<SetCard>>,
    total_packs: usize,
    /// `None` means nobody is in charge right now.
    host: Option<String>,
    /// Insertion-ordered so seat assignment at game start is deterministic.
    clients: IndexMap<String, SessionHandle>,
    seats: HashMap<String, usize>,
    /// Every broadcast so far, replayed to (re)joining clients.
    messages: Vec<Message>,
    /// Pick-increment sender of the current round's ticker.
    pick_tx: Option<mpsc::Sender<()>>,
    handle: DirectorHandle,
    events: mpsc::Receiver<DirectorEvent>,
}

impl GameDirector {
    pub fn new(
        options: GeneralOptions,
        game_id: impl Into<String>,
        resources: DraftResources,
        server_force_pick: bool,
    ) -> (GameDirector, DirectorHandle) {
        let (events_tx, events_rx) = mpsc::channel(CHANNEL_BUFFER_SIZE);
        let handle = DirectorHandle { events: events_tx };
        let director = GameDirector {
            game_id: game_id.into(),
            options,
            game_started: false,
            pack_number: 0,
            round: 1,
            round_timer: None,
            server_force_pick,
            round_packs: resources.round_packs,
            next_round_packs: HashMap::new(),
            total_packs: resources.total_packs,
            host: None,
            clients: IndexMap::new(),
            seats: HashMap::new(),
            messages: Vec::new(),
            pick_tx: None,
            handle: handle.clone(),
            events: events_rx,
        };
        (director, handle)
    }

    /// Runs the event loop until the draft ends. The return value is the
    /// process exit code: 0 for a completed draft, 1 when the roster stayed
    /// empty past the host grace period.
    pub async fn run(mut self) -> i32 {
        tracing::info!(game = %self.game_id, "director listening");
        while let Some(event) = self.events.recv().await {
            match event {
                DirectorEvent::AddClient(session) => self.add_client(session),
                DirectorEvent::DeleteClient { id, generation } => {
                    self.delete_client(&id, generation)
                }
                DirectorEvent::ClientMessage { id, msg } => self.client_message(id, msg),
                DirectorEvent::StartNextRound => self.advance_round(),
                DirectorEvent::SendAll(msg) => self.broadcast(msg),
                DirectorEvent::Error(err) => self.report(&err),
                DirectorEvent::HostGraceExpired => {
                    if self.clients.is_empty() {
                        tracing::error!(game = %self.game_id, "no host within the grace period");
                        return 1;
                    }
                }
                DirectorEvent::Shutdown => {
                    self.end_game();
                    return 0;
                }
            }
        }
        0
    }

    fn report(&self, err: &DirectorError) {
        tracing::error!(game = %self.game_id, error = %err, "error occurred");
    }

    /// Appends to the replay backlog, then fans out to every client.
    fn broadcast(&mut self, msg: Message) {
        tracing::debug!(kind = ?msg.kind, "sending to all clients");
        self.messages.push(msg.clone());
        for session in self.clients.values() {
            session.write(&msg);
        }
    }

    fn add_client(&mut self, session: SessionHandle) {
        let id = session.id.clone();
        let reconnected = match self.clients.insert(id.clone(), session) {
            Some(previous) => {
                tracing::debug!(client = %id, "reconnect, retiring the previous wire");
                previous.shutdown();
                if let Some(current) = self.clients.get_mut(&id) {
                    current.pool = previous.pool;
                }
                true
            }
            None => false,
        };
        tracing::debug!(client = %id, total = self.clients.len(), "added client");

        // Everything broadcast so far, whether missed or never seen.
        if let Some(session) = self.clients.get(&id) {
            for msg in &self.messages {
                session.write(msg);
            }
        }
        if reconnected && self.game_started {
            self.resume_client(&id);
        }

        if self.host.is_none() {
            self.host = Some(id.clone());
            if let Some(session) = self.clients.get(&id) {
                session.write(&Message::new(GameMessageType::HostChange, "1"));
            }
            tracing::info!(host = %id, "assigned first host");
        }

        let count = Message::new(GameMessageType::NewPlayer, self.clients.len().to_string());
        self.broadcast(count);
    }

    /// Puts a rejoining client back where it left off: the pack in front of
    /// its seat (unless it already picked this round) and its pool.
    fn resume_client(&self, id: &str) {
        let Some(session) = self.clients.get(id) else {
            return;
        };
        if let (Some(seat), Some(current)) =
            (self.seats.get(id), self.round_packs.get(&self.pack_number))
        {
            if let Some(Some(pack)) = current.player_packs.get(seat) {
                let content = CardPack {
                    set_name: current.set_abbreviation.clone(),
                    round: self.round,
                    pack_number: self.pack_number + 1,
                    pack: pack.clone(),
                    timer: self.round_timer.map(|t| t.round_time(self.round).as_secs()),
                };
                match serde_json::to_string(&content) {
                    Ok(data) => session.write(&Message::new(GameMessageType::RoundContent, data)),
                    Err(err) => self.report(&DirectorError::Malformed(err)),
                }
            }
        }
        match serde_json::to_string(&session.pool) {
            Ok(pool) => session.write(&Message::new(GameMessageType::PoolContent, pool)),
            Err(err) => self.report(&DirectorError::Malformed(err)),
        }
    }

    fn delete_client(&mut self, id: &str, generation: u64) {
        match self.clients.get(id) {
            Some(session) if session.generation == generation => {}
            // Unknown id, or a stale wire of a client that already came back.
            _ => return,
        }
        self.clients.shift_remove(id);
        tracing::debug!(client = %id, remaining = self.clients.len(), "removed client");

        if self.host.as_deref() == Some(id) {
            self.promote_new_host();
        }

        let count = Message::new(GameMessageType::NewPlayer, self.clients.len().to_string());
        let handle = self.handle.clone();
        tokio::spawn(async move { handle.send_all(count).await });
    }

    fn promote_new_host(&mut self) {
        match self.clients.keys().next().cloned() {
            Some(next_host) => {
                if let Some(session) = self.clients.get(&next_host) {
                    session.write(&Message::new(GameMessageType::HostChange, "1"));
                }
                tracing::info!(host = %next_host, "promoted new host");
                self.host = Some(next_host);
            }
            None => {
                self.host = None;
                tracing::warn!(
                    grace_secs = HOST_GRACE.as_secs(),
                    "no clients left, shutting down unless someone returns"
                );
                let handle = self.handle.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(HOST_GRACE).await;
                    handle.host_grace_expired().await;
                });
            }
        }
    }

    fn client_message(&mut self, id: String, msg: Message) {
        match msg.kind {
            GameMessageType::ChatMessage => self.broadcast(msg),
            GameMessageType::StartGame => {
                if self.game_started {
                    return;
                }
                if self.host.as_deref() != Some(id.as_str()) {
                    self.report(&DirectorError::NotHost(id));
                    return;
                }
                match serde_json::from_str::<TimerSettings>(&msg.data) {
                    Ok(settings) => self.round_timer = RoundTimer::parse(&settings.timer),
                    Err(err) => self.report(&DirectorError::Malformed(err)),
                }
                tracing::info!(game = %self.game_id, timer = ?self.round_timer, "starting game");
                self.broadcast(msg);
                self.start_game();
            }
            GameMessageType::ChooseCard => {
                if !self.game_started {
                    return;
                }
                match self.handle_choose_card(&id, &msg.data) {
                    Ok(()) => {
                        if let Some(picks) = &self.pick_tx {
                            // Sized to the seat count, so this cannot be full;
                            // after round end the ticker is simply gone.
                            let _ = picks.try_send(());
                        }
                    }
                    Err(err) => self.report(&err),
                }
            }
            _ => {}
        }
    }

    fn start_game(&mut self) {
        self.game_started = true;
        match (self.options.game_type, self.options.game_mode) {
            (GameType::Draft, GameMode::Regular) => {
                let Some(current) = self.round_packs.get(&self.pack_number) else {
                    self.report(&DirectorError::NoActivePack);
                    return;
                };
                // One seat per dealt booster, in join order.
                let seated: Vec<String> = self
                    .clients
                    .keys()
                    .take(current.player_packs.len())
                    .cloned()
                    .collect();
                for (seat, id) in seated.into_iter().enumerate() {
                    self.seats.insert(id, seat);
                }
                self.dispatch_round_content();
                self.start_round_ticker();
            }
            (game_type, game_mode) => {
                // The pick protocol only exists for the regular draft; the
                // remaining modes stop at resource accounting.
                tracing::info!(
                    ?game_type,
                    ?game_mode,
                    total_packs = self.total_packs,
                    "game started without a draft protocol"
                );
            }
        }
    }

    /// Sends every seated player the pack currently in front of it.
    fn dispatch_round_content(&self) {
        let Some(current) = self.round_packs.get(&self.pack_number) else {
            return;
        };
        let timer = self.round_timer.map(|t| t.round_time(self.round).as_secs());
        for (id, seat) in &self.seats {
            let Some(session) = self.clients.get(id) else {
                continue;
            };
            let Some(Some(pack)) = current.player_packs.get(seat) else {
                continue;
            };
            let content = CardPack {
                set_name: current.set_abbreviation.clone(),
                round: self.round,
                pack_number: self.pack_number + 1,
                pack: pack.clone(),
                timer,
            };
            match serde_json::to_string(&content) {
                Ok(data) => session.write(&Message::new(GameMessageType::RoundContent, data)),
                Err(err) => self.report(&DirectorError::Malformed(err)),
            }
        }
    }

    fn start_round_ticker(&mut self) {
        let timeout = match (self.round_timer, self.server_force_pick) {
            (Some(timer), true) => Some(timer.round_time(self.round)),
            _ => None,
        };
        self.pick_tx = Some(round_ticker::start(
            self.handle.clone(),
            self.seats.len(),
            self.round,
            timeout,
        ));
    }

    /// Applies one pick. Nothing changes unless every check passes, so a
    /// rejected pick leaves the table untouched.
    fn handle_choose_card(&mut self, client_id: &str, data: &str) -> Result<(), DirectorError> {
        let selected: ChooseCardJson = serde_json::from_str(data)?;

        if !self.clients.contains_key(client_id) {
            return Err(DirectorError::UnknownClient(client_id.to_string()));
        }
        let seat = *self
            .seats
            .get(client_id)
            .ok_or_else(|| DirectorError::NotSeated(client_id.to_string()))?;
        let seat_count = self.seats.len();
        let pack_number = self.pack_number;

        let round = self
            .round_packs
            .get_mut(&pack_number)
            .ok_or(DirectorError::NoActivePack)?;
        let slot = round
            .player_packs
            .get_mut(&seat)
            .ok_or_else(|| DirectorError::AlreadyChose(client_id.to_string()))?;
        let Some(pack) = slot.as_ref() else {
            return Err(DirectorError::AlreadyChose(client_id.to_string()));
        };
        let index = usize::try_from(selected.picked_card_index)
            .ok()
            .filter(|index| *index < pack.len())
            .ok_or(DirectorError::InvalidCardIndex {
                client: client_id.to_string(),
                index: selected.picked_card_index,
            })?;

        // Take the pack out of the table; the seat is marked as picked.
        let mut remaining = slot.take().unwrap_or_default();
        let card = remaining.remove(index);
        let next_seat = seat_for_next_round(seat, pack_number, seat_count);
        self.next_round_packs.insert(next_seat, remaining);

        let session = self
            .clients
            .get_mut(client_id)
            .ok_or_else(|| DirectorError::UnknownClient(client_id.to_string()))?;
        session.pool.push(card);
        let pool = serde_json::to_string(&session.pool)?;
        session.write(&Message::new(GameMessageType::PoolContent, pool));
        Ok(())
    }

    fn all_seats_picked(&self) -> bool {
        self.round_packs
            .get(&self.pack_number)
            .is_some_and(|round| round.player_packs.values().all(|slot| slot.is_none()))
    }

    /// The current pack is exhausted once every rotated pack is empty.
    fn should_start_new_pack(&self) -> bool {
        let empty = self
            .next_round_packs
            .values()
            .filter(|pack| pack.is_empty())
            .count();
        empty == self.seats.len()
    }

    fn end_of_draft(&self) -> bool {
        !self.round_packs.contains_key(&self.pack_number)
    }

    /// Synthesizes an index-0 pick for every seat that stalled this round.
    fn force_picks(&mut self) -> Result<(), DirectorError> {
        let force = serde_json::to_string(&ChooseCardJson {
            picked_card_index: 0,
        })?;
        let stalling: Vec<usize> = self
            .round_packs
            .get(&self.pack_number)
            .map(|round| {
                round
                    .player_packs
                    .iter()
                    .filter(|(_, slot)| slot.is_some())
                    .map(|(seat, _)| *seat)
                    .collect()
            })
            .unwrap_or_default();

        for seat in stalling {
            let client_id = self
                .client_id_by_seat(seat)
                .ok_or(DirectorError::NoClientAtSeat(seat))?;
            self.handle_choose_card(&client_id, &force)?;
        }
        Ok(())
    }

    fn client_id_by_seat(&self, seat: usize) -> Option<String> {
        self.seats
            .iter()
            .find(|(_, assigned)| **assigned == seat)
            .map(|(id, _)| id.clone())
    }

    /// Copies the rotated packs into the round table. The entries stay in
    /// `next_round_packs` until the next pack starts; that set going
    /// all-empty is how pack exhaustion shows up at the following end of
    /// round.
    fn rotate_packs(&mut self) {
        if let Some(round) = self.round_packs.get_mut(&self.pack_number) {
            for (seat, pack) in &self.next_round_packs {
                round.player_packs.insert(*seat, Some(pack.clone()));
            }
        }
    }

    /// Reacts to the ticker: next round or next pack, force-picking stalled
    /// seats first, then either dispatches new content or ends the draft.
    fn advance_round(&mut self) {
        if self.should_start_new_pack() {
            self.pack_number += 1;
            self.round = 1;
            self.next_round_packs.clear();
            tracing::info!(pack_number = self.pack_number + 1, "starting next pack");
        } else {
            if !self.all_seats_picked() {
                tracing::info!(round = self.round, "forcing autopicks for stalling seats");
                if let Err(err) = self.force_picks() {
                    self.report(&err);
                    self.post_shutdown();
                    return;
                }
            }
            self.round += 1;
            self.rotate_packs();
        }

        if self.end_of_draft() {
            tracing::info!(game = %self.game_id, "last pack drafted, shutting down");
            self.post_shutdown();
        } else {
            self.dispatch_round_content();
            self.start_round_ticker();
        }
    }

    fn post_shutdown(&self) {
        let handle = self.handle.clone();
        tokio::spawn(async move { handle.shutdown().await });
    }

    fn end_game(&mut self) {
        let msg = Message::new(GameMessageType::EndGame, self.clients.len().to_string());
        for session in self.clients.values() {
            session.write(&msg);
            session.shutdown();
        }
        self.pick_tx = None;
        tracing::info!(game = %self.game_id, "ended game");
    }
}

/// Where a seat's leftover pack goes: left on even pack numbers, right on
/// odd ones.
fn seat_for_next_round(seat: usize, pack_number: usize, seats: usize) -> usize {
    if pack_number % 2 == 0 {
        (seat + 1) % seats
    } else {
        (seat + seats - 1) % seats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModeMap;
    use tokio::sync::watch;
    use tokio::time::timeout;

    const RECV_WAIT: Duration = Duration::from_secs(90);

    fn regular_options(total_players: usize) -> GeneralOptions {
        GeneralOptions {
            total_players,
            game_title: String::new(),
            private_game: false,
            game_mode: GameMode::Regular,
            game_type: GameType::Draft,
            options: ModeMap::default(),
        }
    }

    fn named_pack(names: &[&str]) -> Vec<SetCard> {
        names.iter().map(|name| SetCard::named(*name)).collect()
    }

    fn one_set(set: &str, packs: Vec<Vec<SetCard>>) -> DraftResources {
        DraftResources {
            round_packs: HashMap::from([(0, DraftRound::new(set, packs))]),
            total_packs: 1,
        }
    }

    struct TestClient {
        id: String,
        rx: mpsc::Receiver<Message>,
        done: watch::Receiver<bool>,
    }

    async fn connect(handle: &DirectorHandle, id: &str, generation: u64) -> TestClient {
        let (session, rx, done) = SessionHandle::create(id.to_string(), generation);
        handle.add_client(session).await;
        TestClient {
            id: id.to_string(),
            rx,
            done,
        }
    }

    async fn recv(client: &mut TestClient) -> Message {
        timeout(RECV_WAIT, client.rx.recv())
            .await
            .unwrap_or_else(|_| panic!("{} timed out waiting for a message", client.id))
            .unwrap_or_else(|| panic!("{} mailbox closed", client.id))
    }

    async fn recv_kind(client: &mut TestClient, kind: GameMessageType) -> Message {
        loop {
            let msg = recv(client).await;
            if msg.kind == kind {
                return msg;
            }
        }
    }

    async fn start_draft(handle: &DirectorHandle, host: &str, timer: &str) {
        let data = serde_json::to_string(&TimerSettings {
            timer: timer.to_string(),
        })
        .unwrap();
        handle
            .client_message(
                host.to_string(),
                Message::new(GameMessageType::StartGame, data),
            )
            .await;
    }

    async fn pick(handle: &DirectorHandle, id: &str, index: i64) {
        let data = serde_json::to_string(&ChooseCardJson {
            picked_card_index: index,
        })
        .unwrap();
        handle
            .client_message(
                id.to_string(),
                Message::new(GameMessageType::ChooseCard, data),
            )
            .await;
    }

    fn round_content(msg: &Message) -> CardPack {
        serde_json::from_str(&msg.data).unwrap()
    }

    fn pool_names(msg: &Message) -> Vec<String> {
        let pool: Vec<SetCard> = serde_json::from_str(&msg.data).unwrap();
        pool.into_iter().map(|card| card.name).collect()
    }

    fn pack_names(content: &CardPack) -> Vec<String> {
        content.pack.iter().map(|card| card.name.clone()).collect()
    }

    #[test]
    fn rotation_alternates_with_pack_parity() {
        assert_eq!(seat_for_next_round(0, 0, 3), 1);
        assert_eq!(seat_for_next_round(2, 0, 3), 0);
        assert_eq!(seat_for_next_round(0, 1, 3), 2);
        assert_eq!(seat_for_next_round(2, 1, 3), 1);
        assert_eq!(seat_for_next_round(1, 2, 2), 0);
    }

    #[tokio::test]
    async fn first_client_becomes_host() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["a"]), named_pack(&["b"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let host = recv(&mut p0).await;
        assert_eq!(host.kind, GameMessageType::HostChange);
        assert_eq!(host.data, "1");
        let count = recv(&mut p0).await;
        assert_eq!(count.kind, GameMessageType::NewPlayer);
        assert_eq!(count.data, "1");
    }

    #[tokio::test]
    async fn three_player_draft_rotates_left_and_fills_pools() {
        let packs = (0..3)
            .map(|seat| {
                (0..5)
                    .map(|card| SetCard::named(format!("s{seat}c{card}")))
                    .collect()
            })
            .collect();
        let (director, handle) =
            GameDirector::new(regular_options(3), "g", one_set("M19", packs), true);
        let director_task = tokio::spawn(director.run());

        let mut clients = Vec::new();
        for seq in 0..3 {
            clients.push(connect(&handle, &format!("g_{seq}"), seq).await);
        }
        start_draft(&handle, "g_0", "").await;

        let mut p0_first_cards = Vec::new();
        for round in 1..=5u32 {
            for client in clients.iter_mut() {
                let content = round_content(&recv_kind(client, GameMessageType::RoundContent).await);
                assert_eq!(content.round, round);
                assert_eq!(content.pack_number, 1);
                assert_eq!(content.timer, None);
                assert_eq!(content.pack.len(), 6 - round as usize);
                if client.id == "g_0" {
                    p0_first_cards.push(content.pack[0].name.clone());
                }
            }
            for seq in 0..3 {
                pick(&handle, &format!("g_{seq}"), 0).await;
            }
        }

        // Packs travel leftward on pack 0, so seat 0 drafts from packs that
        // originated at seats 0, 2, 1, 0, 2.
        assert_eq!(
            p0_first_cards,
            vec!["s0c0", "s2c1", "s1c2", "s0c3", "s2c4"]
        );

        let pool = pool_names(&recv_kind(&mut clients[0], GameMessageType::PoolContent).await);
        assert_eq!(pool, vec!["s0c0", "s2c1", "s1c2", "s0c3", "s2c4"]);

        for client in clients.iter_mut() {
            let end = recv_kind(client, GameMessageType::EndGame).await;
            assert_eq!(end.data, "3");
        }
        assert_eq!(director_task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_forces_autopicks_and_rotates() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["A", "B"]), named_pack(&["C", "D"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let mut p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "fast").await;

        let first = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(first.timer, Some(40));
        assert_eq!(pack_names(&first), vec!["A", "B"]);

        pick(&handle, "g_0", 0).await;
        let pool = recv_kind(&mut p0, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&pool), vec!["A"]);

        // P1 stalls; the ticker runs the 40 s budget down and the director
        // autopicks index 0 from P1's pack.
        let p1_pool = recv_kind(&mut p1, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&p1_pool), vec!["C"]);

        let second_p0 = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(second_p0.round, 2);
        assert_eq!(second_p0.timer, Some(35));
        assert_eq!(pack_names(&second_p0), vec!["D"]);

        let second_p1 = round_content(&recv_kind(&mut p1, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&second_p1), vec!["B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn stall_on_final_pick_still_deals_next_pack() {
        let resources = DraftResources {
            round_packs: HashMap::from([
                (
                    0,
                    DraftRound::new("M19", vec![named_pack(&["A"]), named_pack(&["B"])]),
                ),
                (
                    1,
                    DraftRound::new("DOM", vec![named_pack(&["E", "F"]), named_pack(&["G", "H"])]),
                ),
            ]),
            total_packs: 2,
        };
        let (director, handle) = GameDirector::new(regular_options(2), "g", resources, true);
        let director_task = tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let mut p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "fast").await;

        let first = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&first), vec!["A"]);
        pick(&handle, "g_0", 0).await;

        // P1 sits on the last card of the pack until the timer autopicks it.
        let forced = recv_kind(&mut p1, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&forced), vec!["B"]);

        // One empty filler round goes out while the table notices the pack
        // is spent, then the second pack must be dealt rather than the draft
        // dying on the exhausted first one.
        let filler = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(filler.pack_number, 1);
        assert_eq!(filler.round, 2);
        assert!(filler.pack.is_empty());

        let fresh = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(fresh.pack_number, 2);
        assert_eq!(fresh.round, 1);
        assert_eq!(fresh.set_name, "DOM");
        assert_eq!(pack_names(&fresh), vec!["E", "F"]);

        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;
        let second = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&second), vec!["H"]);
        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;

        let pool = pool_names(&recv_kind(&mut p0, GameMessageType::PoolContent).await);
        assert_eq!(pool, vec!["A", "E", "H"]);
        let mut pool = Vec::new();
        for _ in 0..2 {
            pool = pool_names(&recv_kind(&mut p1, GameMessageType::PoolContent).await);
        }
        assert_eq!(pool, vec!["B", "G", "F"]);
        assert_eq!(director_task.await.unwrap(), 0);
    }

    #[tokio::test]
    async fn host_is_handed_off_on_disconnect() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["a"]), named_pack(&["b"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let mut p1 = connect(&handle, "g_1", 1).await;
        assert_eq!(
            recv(&mut p0).await.kind,
            GameMessageType::HostChange,
            "first client is host"
        );

        handle.delete_client("g_0".to_string(), 0).await;
        let promotion = recv_kind(&mut p1, GameMessageType::HostChange).await;
        assert_eq!(promotion.data, "1");

        // The promoted host may start the game.
        start_draft(&handle, "g_1", "").await;
        let content = recv_kind(&mut p1, GameMessageType::RoundContent).await;
        assert_eq!(round_content(&content).round, 1);
    }

    #[tokio::test]
    async fn start_game_is_host_only() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["a"]), named_pack(&["b"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let _p1 = connect(&handle, "g_1", 1).await;

        // Picks before the game starts fall on the floor.
        pick(&handle, "g_0", 0).await;
        // A non-host start is rejected; the host's one afterwards wins, and
        // its timer choice is the one that sticks.
        start_draft(&handle, "g_1", "fast").await;
        start_draft(&handle, "g_0", "").await;

        let mut seen = Vec::new();
        let content = loop {
            let msg = recv(&mut p0).await;
            if msg.kind == GameMessageType::RoundContent {
                break round_content(&msg);
            }
            seen.push(msg.kind);
        };
        assert_eq!(content.timer, None, "the rejected start must not win");
        assert!(!seen.contains(&GameMessageType::PoolContent));
    }

    #[tokio::test]
    async fn chat_order_is_identical_for_every_receiver() {
        let (director, handle) = GameDirector::new(
            regular_options(3),
            "g",
            one_set("M19", vec![named_pack(&["a"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut clients = Vec::new();
        for seq in 0..3 {
            clients.push(connect(&handle, &format!("g_{seq}"), seq).await);
        }

        for (from, text) in [("g_0", "A"), ("g_1", "C"), ("g_0", "B")] {
            handle
                .client_message(
                    from.to_string(),
                    Message::new(GameMessageType::ChatMessage, text),
                )
                .await;
        }

        let mut transcripts = Vec::new();
        for client in clients.iter_mut() {
            let mut chats = Vec::new();
            for _ in 0..3 {
                chats.push(recv_kind(client, GameMessageType::ChatMessage).await.data);
            }
            transcripts.push(chats);
        }
        assert_eq!(transcripts[0], transcripts[1]);
        assert_eq!(transcripts[1], transcripts[2]);
        let a = transcripts[0].iter().position(|m| m == "A").unwrap();
        let b = transcripts[0].iter().position(|m| m == "B").unwrap();
        assert!(a < b, "a sender's own ordering is preserved");
    }

    #[tokio::test]
    async fn invalid_pick_changes_nothing() {
        let s0 = named_pack(&["a0", "a1", "a2", "a3", "a4"]);
        let s1 = named_pack(&["b0", "b1", "b2", "b3", "b4"]);
        let (director, handle) =
            GameDirector::new(regular_options(2), "g", one_set("M19", vec![s0, s1]), true);
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let _p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "").await;

        pick(&handle, "g_0", 5).await;
        pick(&handle, "g_0", -1).await;
        pick(&handle, "g_0", 4).await;

        // Only the valid pick produced an acknowledgement, and the pack was
        // still complete when it landed: index 4 exists in a 5 card pack.
        let pool = recv_kind(&mut p0, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&pool), vec!["a4"]);

        pick(&handle, "g_1", 0).await;
        let second = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&second), vec!["b1", "b2", "b3", "b4"]);
    }

    #[tokio::test]
    async fn second_pick_in_a_round_is_rejected() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["A", "B"]), named_pack(&["C", "D"])]),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let _p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "").await;

        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;

        let pool = recv_kind(&mut p0, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&pool), vec!["A"]);
        // The duplicate pick produced no second pool update; the next thing
        // P0 sees is the new round.
        let next = recv(&mut p0).await;
        assert_eq!(next.kind, GameMessageType::RoundContent);
        assert_eq!(pack_names(&round_content(&next)), vec!["D"]);
    }

    #[tokio::test]
    async fn reconnect_restores_pool_seat_and_backlog() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set(
                "M19",
                vec![named_pack(&["A", "B", "C"]), named_pack(&["X", "Y", "Z"])],
            ),
            true,
        );
        tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let _p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "").await;

        recv_kind(&mut p0, GameMessageType::RoundContent).await;
        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;
        let before = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&before), vec!["Y", "Z"]);

        // The wire drops and comes back with the draft cookie.
        let mut rejoined = connect(&handle, "g_0", 7).await;

        let first = recv(&mut rejoined).await;
        assert!(*p0.done.borrow(), "old wire must be told to shut down");
        assert_eq!(first.kind, GameMessageType::NewPlayer);
        assert_eq!(recv(&mut rejoined).await.kind, GameMessageType::NewPlayer);
        assert_eq!(recv(&mut rejoined).await.kind, GameMessageType::StartGame);
        let resumed = round_content(&recv_kind(&mut rejoined, GameMessageType::RoundContent).await);
        assert_eq!(resumed.round, 2);
        assert_eq!(pack_names(&resumed), pack_names(&before));
        let pool = recv_kind(&mut rejoined, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&pool), vec!["A"]);

        // The stale wire's departure must not evict the reconnected session.
        handle.delete_client("g_0".to_string(), 0).await;
        pick(&handle, "g_0", 0).await;
        let pool = recv_kind(&mut rejoined, GameMessageType::PoolContent).await;
        assert_eq!(pool_names(&pool), vec!["A", "Y"]);
    }

    #[tokio::test]
    async fn second_pack_rotates_the_other_way() {
        let resources = DraftResources {
            round_packs: HashMap::from([
                (
                    0,
                    DraftRound::new("M19", vec![named_pack(&["A", "B"]), named_pack(&["C", "D"])]),
                ),
                (
                    1,
                    DraftRound::new("DOM", vec![named_pack(&["E", "F"]), named_pack(&["G", "H"])]),
                ),
            ]),
            total_packs: 2,
        };
        let (director, handle) = GameDirector::new(regular_options(2), "g", resources, true);
        let director_task = tokio::spawn(director.run());

        let mut p0 = connect(&handle, "g_0", 0).await;
        let mut p1 = connect(&handle, "g_1", 1).await;
        start_draft(&handle, "g_0", "").await;

        for _ in 0..2 {
            recv_kind(&mut p0, GameMessageType::RoundContent).await;
            pick(&handle, "g_0", 0).await;
            pick(&handle, "g_1", 0).await;
        }

        // Pack 0 is spent; pack 1 deals fresh boosters and rotates rightward.
        let fresh = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(fresh.pack_number, 2);
        assert_eq!(fresh.round, 1);
        assert_eq!(fresh.set_name, "DOM");
        assert_eq!(pack_names(&fresh), vec!["E", "F"]);

        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;
        let second = round_content(&recv_kind(&mut p0, GameMessageType::RoundContent).await);
        assert_eq!(pack_names(&second), vec!["H"], "seat 1 passes right to seat 0");

        pick(&handle, "g_0", 0).await;
        pick(&handle, "g_1", 0).await;

        let pool = pool_names(&recv_kind(&mut p0, GameMessageType::PoolContent).await);
        assert_eq!(pool, vec!["A", "D", "E", "H"]);
        // P1's stream was never drained, so walk through all four of its
        // pool updates and check the final one.
        let mut pool = Vec::new();
        for _ in 0..4 {
            pool = pool_names(&recv_kind(&mut p1, GameMessageType::PoolContent).await);
        }
        assert_eq!(pool, vec!["C", "B", "G", "F"]);
        assert_eq!(director_task.await.unwrap(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_roster_shuts_down_after_grace() {
        let (director, handle) = GameDirector::new(
            regular_options(2),
            "g",
            one_set("M19", vec![named_pack(&["a"]), named_pack(&["b"])]),
            true,
        );
        let director_task = tokio::spawn(director.run());

        let _p0 = connect(&handle, "g_0", 0).await;
        handle.delete_client("g_0".to_string(), 0).await;

        assert_eq!(director_task.await.unwrap(), 1);
    }
}
