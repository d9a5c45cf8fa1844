mod config;

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use axum::{
    Router,
    extract::{
        State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::IntoResponse,
    routing::get,
};
use dashmap::DashMap;
use futures_util::{SinkExt, stream::StreamExt};
use parking_lot::Mutex as P_Mutex;
use tokio::sync::{RwLock, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use config::ServerConfig;
use tichu_core::{
    ActionError, ClientMessage, Game, GameConfig, GameEvent, PlayerId, PlayerSecret, RoomId, SEATS, Seat,
    SeatView, ServerMessage,
};

// 服务器全局状态
struct AppState {
    rooms: DashMap<RoomId, Arc<Room>>,
    config: ServerConfig,
}

// 单个房间的状态
// 重要‼️：严格规定使用锁的顺序，避免死锁：
// players -> table
// table 是同步锁，持有期间不能 await
struct Room {
    table: P_Mutex<Table>,
    // 将 PlayerId 映射到具体的网络连接
    players: RwLock<HashMap<PlayerId, PlayerConnection>>,
}

struct Table {
    members: Vec<Member>,
    game: Option<Game>,
    /// 每接受一个动作加一，超时任务据此判断计时是否已经过期
    version: u64,
}

struct Member {
    id: PlayerId,
    secret: PlayerSecret,
    nickname: String,
}

// 玩家的网络连接
struct PlayerConnection {
    // 用于向该玩家的 WebSocket 任务发送消息的通道
    sender: mpsc::Sender<ServerMessage>,
}

type SharedState = Arc<AppState>;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ServerConfig::from_env();
    let addr = config.addr;
    let state = SharedState::new(AppState { rooms: DashMap::new(), config });

    let app = Router::new().route("/ws", get(websocket_handler)).with_state(state);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("无法监听 {}: {}", addr, e);
            return;
        }
    };
    info!("服务器正在监听 {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("服务器异常退出: {}", e);
    }
}

/// 处理 WebSocket 连接请求
async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<SharedState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

/// 处理单个 WebSocket 连接的生命周期
async fn handle_socket(socket: WebSocket, state: SharedState) {
    let (mut sender, mut receiver) = socket.split();

    // 其他任务通过这个通道给本连接发消息
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(64);

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let payload = match serde_json::to_string(&msg) {
                Ok(payload) => payload,
                Err(e) => {
                    error!("序列化消息失败: {}", e);
                    continue;
                }
            };
            if sender.send(Message::Text(payload.into())).await.is_err() {
                // 客户端已断开
                break;
            }
        }
    });

    // 入座成功后填充
    let mut player_context: Option<(RoomId, PlayerId)> = None;

    while let Some(Ok(msg)) = receiver.next().await {
        if let Message::Text(text) = msg {
            match serde_json::from_str::<ClientMessage>(&text) {
                Ok(client_msg) => {
                    handle_client_message(client_msg, state.clone(), &tx, &mut player_context).await;
                }
                Err(e) => {
                    warn!("解析消息失败: {}", e);
                    let _ = tx.send(ServerMessage::Error { message: format!("无法解析的消息: {}", e) }).await;
                }
            }
        }
    }

    if let Some((room_id, player_id)) = player_context {
        handle_disconnect(state, room_id, player_id).await;
    }
    info!("客户端连接关闭");
}

async fn send_error(tx: &mpsc::Sender<ServerMessage>, message: &str) {
    let _ = tx.send(ServerMessage::Error { message: message.to_string() }).await;
}

fn find_room(state: &SharedState, room_id: &RoomId) -> Option<Arc<Room>> {
    state.rooms.get(room_id).map(|r| r.clone())
}

/// 核心消息处理逻辑
async fn handle_client_message(
    msg: ClientMessage,
    state: SharedState,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    match msg {
        ClientMessage::CreateRoom { nickname } => {
            if context.is_some() {
                return send_error(tx, "你已经在一个房间里了").await;
            }
            let room_id = Uuid::new_v4();
            let room = Arc::new(Room {
                table: P_Mutex::new(Table { members: Vec::new(), game: None, version: 0 }),
                players: RwLock::new(HashMap::new()),
            });
            state.rooms.insert(room_id, room.clone());
            info!("创建了新房间 {}", room_id);
            seat_player(&state, room, room_id, nickname, tx, context).await;
        }
        ClientMessage::JoinRoom { room_id, nickname } => {
            if context.is_some() {
                return send_error(tx, "你已经在一个房间里了").await;
            }
            match find_room(&state, &room_id) {
                Some(room) => seat_player(&state, room, room_id, nickname, tx, context).await,
                None => send_error(tx, "房间不存在").await,
            }
        }
        ClientMessage::Rejoin { room_id, secret } => {
            if context.is_some() {
                return send_error(tx, "你已经在一个房间里了").await;
            }
            match find_room(&state, &room_id) {
                Some(room) => rejoin(room, room_id, secret, tx, context).await,
                None => send_error(tx, "房间不存在").await,
            }
        }
        ClientMessage::PerformAction(action) => {
            let Some((room_id, player_id)) = *context else {
                return send_error(tx, "请先加入或创建房间").await;
            };
            let Some(room) = find_room(&state, &room_id) else {
                return send_error(tx, "房间不存在").await;
            };

            let outcome = {
                let mut table = room.table.lock();
                let outcome = match table.game.as_mut() {
                    Some(game) => game.handle_action(&player_id, action),
                    None => Err(ActionError::WrongPhase),
                };
                if outcome.is_ok() {
                    table.version += 1;
                }
                outcome
            };

            match outcome {
                Ok(events) => publish(&room, events).await,
                Err(e) => {
                    let _ = tx
                        .send(ServerMessage::Rejected { code: e.code().to_string(), reason: e.to_string() })
                        .await;
                }
            }
        }
    }
}

/// 让新玩家坐到下一个空位；坐满四人时开始比赛
async fn seat_player(
    state: &SharedState,
    room: Arc<Room>,
    room_id: RoomId,
    nickname: String,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    let player_id = Uuid::new_v4();
    let secret = Uuid::new_v4();

    let seated = {
        // r_players write lock
        let mut r_players = room.players.write().await;
        let seated = {
            // table lock
            let mut table = room.table.lock();
            if table.members.len() >= SEATS {
                None
            } else {
                let seat = table.members.len();
                table.members.push(Member { id: player_id, secret, nickname: nickname.clone() });
                let started = if table.members.len() == SEATS { start_game(&mut table, state) } else { None };
                Some((seat, started))
            }
        };
        if seated.is_some() {
            r_players.insert(player_id, PlayerConnection { sender: tx.clone() });
        }
        seated
    };

    let Some((seat, started)) = seated else {
        return send_error(tx, "房间已满").await;
    };

    info!("玩家 {} 坐到了房间 {} 的座位 {}", player_id, room_id, seat);
    *context = Some((room_id, player_id));
    let _ = tx.send(ServerMessage::RoomJoined { room_id, your_id: player_id, your_secret: secret, seat }).await;
    {
        let seated_msg = ServerMessage::PlayerSeated { nickname, seat };
        broadcast(room.players.read().await.iter(), &seated_msg, Some(player_id)).await;
    }

    if let Some(events) = started {
        publish(&room, events).await;
        if let Some(timeout) = state.config.turn_timeout() {
            spawn_turn_timer(&room, timeout);
        }
    }
}

fn start_game(table: &mut Table, state: &SharedState) -> Option<Vec<GameEvent>> {
    let seats: [PlayerId; SEATS] = std::array::from_fn(|s| table.members[s].id);
    let config = GameConfig { target_score: state.config.target_score, seed: None };
    let mut game = Game::new(seats, config);
    match game.start() {
        Ok(events) => {
            table.game = Some(game);
            table.version += 1;
            Some(events)
        }
        Err(e) => {
            error!("开局失败: {}", e);
            None
        }
    }
}

/// 断线重连：凭密钥找到原座位，换上新的身份
async fn rejoin(
    room: Arc<Room>,
    room_id: RoomId,
    secret: PlayerSecret,
    tx: &mpsc::Sender<ServerMessage>,
    context: &mut Option<(RoomId, PlayerId)>,
) {
    let new_id = Uuid::new_v4();
    let rejoined = {
        let mut r_players = room.players.write().await;
        let rejoined = {
            let mut table = room.table.lock();
            match table.members.iter().position(|m| m.secret == secret) {
                None => None,
                Some(seat) => {
                    let old_id = table.members[seat].id;
                    table.members[seat].id = new_id;
                    if let Some(game) = table.game.as_mut() {
                        game.rebind_seat(&old_id, new_id);
                    }
                    let snapshot = table.game.as_ref().map(|game| game.view_for(seat));
                    Some((seat, old_id, snapshot))
                }
            }
        };
        if let Some((_, old_id, _)) = &rejoined {
            r_players.remove(old_id);
            r_players.insert(new_id, PlayerConnection { sender: tx.clone() });
        }
        rejoined
    };

    let Some((seat, old_id, snapshot)) = rejoined else {
        return send_error(tx, "重连凭证无效").await;
    };
    info!("玩家 {} 以新身份 {} 回到房间 {} 的座位 {}", old_id, new_id, room_id, seat);
    *context = Some((room_id, new_id));
    let _ = tx.send(ServerMessage::RoomJoined { room_id, your_id: new_id, your_secret: secret, seat }).await;
    if let Some(view) = snapshot {
        let _ = tx.send(ServerMessage::SeatSnapshot(view)).await;
    }
}

/// 超时代打：状态在一个超时周期内没有推进时，替应当行动的座位执行保守动作
fn spawn_turn_timer(room: &Arc<Room>, timeout: Duration) {
    let weak: Weak<Room> = Arc::downgrade(room);
    tokio::spawn(async move {
        loop {
            let Some(version) = weak.upgrade().map(|room| room.table.lock().version) else {
                break;
            };
            tokio::time::sleep(timeout).await;
            let Some(room) = weak.upgrade() else {
                break;
            };

            let events = {
                let mut table = room.table.lock();
                if table.version != version {
                    continue;
                }
                let Some(game) = table.game.as_mut() else {
                    break;
                };
                if game.is_over() {
                    break;
                }
                let Some((seat, action)) = game.timeout_action() else {
                    continue;
                };
                let name = action.name();
                match game.apply(seat, action) {
                    Ok(events) => {
                        info!(seat, action = name, "超时代打");
                        table.version += 1;
                        events
                    }
                    Err(e) => {
                        warn!(seat, action = name, "超时代打被拒绝: {}", e);
                        continue;
                    }
                }
            };
            publish(&room, events).await;
        }
    });
}

/// 广播事件，再给每个在线玩家推送他自己视角的快照
async fn publish(room: &Room, events: Vec<GameEvent>) {
    let r_players = room.players.read().await;
    let snapshots: Vec<(PlayerId, SeatView)> = {
        let table = room.table.lock();
        match &table.game {
            Some(game) => r_players
                .keys()
                .filter_map(|pid| game.view_for_player(pid).map(|view| (*pid, view)))
                .collect(),
            None => Vec::new(),
        }
    };

    for event in events {
        broadcast(r_players.iter(), &ServerMessage::from(event), None).await;
    }
    for (pid, view) in snapshots {
        if let Some(conn) = r_players.get(&pid) {
            let _ = conn.sender.send(ServerMessage::SeatSnapshot(view)).await;
        }
    }
}

/// 玩家断开连接后的处理。座位保留，凭密钥可以重连。
async fn handle_disconnect(state: SharedState, room_id: RoomId, player_id: PlayerId) {
    info!("玩家 {} 从房间 {} 断开连接", player_id, room_id);
    let Some(room) = find_room(&state, &room_id) else {
        return;
    };

    let mut r_players = room.players.write().await;
    if r_players.remove(&player_id).is_none() {
        // 已经被重连替换掉的旧连接
        return;
    }
    let seated: Option<(Seat, String)> = {
        let table = room.table.lock();
        table
            .members
            .iter()
            .position(|m| m.id == player_id)
            .map(|seat| (seat, table.members[seat].nickname.clone()))
    };
    if let Some((seat, nickname)) = seated {
        let info_msg =
            ServerMessage::Info { message: format!("{} (座位 {}) 断开连接，等待重连", nickname, seat) };
        broadcast(r_players.iter(), &info_msg, None).await;
    }

    if r_players.is_empty() {
        state.rooms.remove(&room_id);
        info!("房间 {} 已空，已被移除", room_id);
    }
}

/// 向房间内所有玩家广播消息
async fn broadcast(
    players: impl Iterator<Item = (&PlayerId, &PlayerConnection)>,
    message: &ServerMessage,
    exclude: Option<PlayerId>,
) {
    for (player_id, conn) in players {
        if Some(*player_id) == exclude {
            continue;
        }
        if conn.sender.send(message.clone()).await.is_err() {
            // 该玩家也断开了，后续由其自己的 handle_socket 任务处理
            warn!("向玩家 {} 发送消息失败（可能已断开）", player_id);
        }
    }
}
