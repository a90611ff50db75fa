//! Per-connection Stratum session.
//!
//! One task owns each TCP connection: frames are processed in arrival
//! order and replies go out in request order, with broadcast notifications
//! interleaved through the session's outbound channel. Session state never
//! leaves this task; everything shared lives in [`Services`].

use std::collections::HashMap;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::services::{Services, unix_now};
use crate::share::{self, ShareError, ShareVerdict};
use crate::stats::{Direction, ShareKind};
use crate::stratum::messages::{self, Method, Request, error_code};
use crate::stratum::wire::{ExtraNonce1, ExtraNonce2, HeaderTime, JobId, Nonce};
use crate::tracing::prelude::*;

/// Longest accepted request line; anything longer is dropped.
const MAX_LINE_LEN: usize = 16 * 1024;

/// Messages pushed into a session from outside its task.
pub enum SessionMessage {
    /// A pre-serialized `mining.notify` line from a template broadcast.
    Job { line: String },
    /// Difficulty imposed by the inactivity sweep.
    SetDifficulty(f64),
}

/// The externally visible face of a session.
pub struct SessionHandle {
    pub peer: SocketAddr,
    authorized: Arc<AtomicBool>,
    sender: mpsc::UnboundedSender<SessionMessage>,
}

/// Live sessions keyed by `host:port`.
#[derive(Default)]
pub struct SessionDirectory {
    sessions: HashMap<String, SessionHandle>,
}

impl SessionDirectory {
    pub fn insert(&mut self, client_id: String, handle: SessionHandle) {
        self.sessions.insert(client_id, handle);
    }

    pub fn remove(&mut self, client_id: &str) {
        self.sessions.remove(client_id);
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queue a notify line to every authorized session. Returns how many
    /// sessions it reached.
    pub fn broadcast_job(&self, line: &str) -> usize {
        let mut reached = 0;
        for handle in self.sessions.values() {
            if handle.authorized.load(Ordering::Relaxed) {
                let sent = handle
                    .sender
                    .send(SessionMessage::Job {
                        line: line.to_string(),
                    })
                    .is_ok();
                if sent {
                    reached += 1;
                }
            }
        }
        reached
    }

    /// Queue a sweep-imposed difficulty for one session.
    pub fn send_difficulty(&self, client_id: &str, difficulty: f64) -> bool {
        self.sessions
            .get(client_id)
            .map(|handle| {
                handle
                    .sender
                    .send(SessionMessage::SetDifficulty(difficulty))
                    .is_ok()
            })
            .unwrap_or(false)
    }
}

/// One outbound line, tagged so notifications get into the method log.
enum Frame {
    Response(String),
    Notification {
        method: &'static str,
        line: String,
    },
}

struct Session {
    client_id: String,
    services: Arc<Services>,
    authorized_flag: Arc<AtomicBool>,
    subscription_id: Option<String>,
    extranonce1: Option<ExtraNonce1>,
    worker_name: Option<String>,
    authorized: bool,
    difficulty: f64,
    /// Extension parameters recorded from `mining.configure`.
    extensions: HashMap<String, Value>,
}

/// Run a session to completion. Cleans up its shared state on the way out.
pub async fn run(
    stream: TcpStream,
    peer: SocketAddr,
    services: Arc<Services>,
    shutdown: CancellationToken,
) {
    let client_id = peer.to_string();
    info!(client = %client_id, "New connection");

    let (sender, mut rx) = mpsc::unbounded_channel();
    let authorized_flag = Arc::new(AtomicBool::new(false));
    services.sessions.lock().insert(
        client_id.clone(),
        SessionHandle {
            peer,
            authorized: Arc::clone(&authorized_flag),
            sender,
        },
    );

    let mut session = Session {
        client_id: client_id.clone(),
        services: Arc::clone(&services),
        authorized_flag,
        subscription_id: None,
        extranonce1: None,
        worker_name: None,
        authorized: false,
        difficulty: services.vardiff.lock().difficulty(&client_id),
        extensions: HashMap::new(),
    };

    let mut framed = Framed::new(stream, LinesCodec::new_with_max_length(MAX_LINE_LEN));

    'outer: loop {
        tokio::select! {
            frame = framed.next() => match frame {
                Some(Ok(line)) => {
                    let frames = session.handle_line(&line).await;
                    for frame in frames {
                        if write_frame(&mut framed, &services, frame).await.is_err() {
                            break 'outer;
                        }
                    }
                }
                Some(Err(LinesCodecError::MaxLineLengthExceeded)) => {
                    warn!(client = %client_id, "Dropping oversized line");
                }
                Some(Err(err)) => {
                    debug!(client = %client_id, error = %err, "Read error");
                    break;
                }
                None => break,
            },
            Some(message) = rx.recv() => {
                let frame = match message {
                    SessionMessage::Job { line } => Frame::Notification {
                        method: messages::NOTIFY,
                        line,
                    },
                    SessionMessage::SetDifficulty(difficulty) => {
                        session.difficulty = difficulty;
                        Frame::Notification {
                            method: messages::SET_DIFFICULTY,
                            line: messages::set_difficulty_line(difficulty),
                        }
                    }
                };
                if write_frame(&mut framed, &services, frame).await.is_err() {
                    break;
                }
            }
            _ = shutdown.cancelled() => break,
        }
    }

    services.sessions.lock().remove(&client_id);
    services.vardiff.lock().remove_client(&client_id);
    if let Some(worker) = &session.worker_name {
        services.stats.lock().worker_disconnected(worker);
    }
    info!(client = %client_id, "Connection closed");
}

async fn write_frame(
    framed: &mut Framed<TcpStream, LinesCodec>,
    services: &Services,
    frame: Frame,
) -> Result<(), LinesCodecError> {
    let line = match frame {
        Frame::Response(line) => line,
        Frame::Notification { method, line } => {
            services
                .stats
                .lock()
                .record_method(Direction::PoolToMiner, method, unix_now());
            line
        }
    };
    framed.send(line).await
}

fn reply(out: &mut Vec<Frame>, id: Option<&Value>, result: Value) {
    if let Some(id) = id {
        out.push(Frame::Response(messages::response(id, result)));
    }
}

fn reply_error(out: &mut Vec<Frame>, id: Option<&Value>, code: i64, message: &str) {
    if let Some(id) = id {
        out.push(Frame::Response(messages::error_response(id, code, message)));
    }
}

fn set_difficulty_frame(difficulty: f64) -> Frame {
    Frame::Notification {
        method: messages::SET_DIFFICULTY,
        line: messages::set_difficulty_line(difficulty),
    }
}

impl Session {
    async fn handle_line(&mut self, line: &str) -> Vec<Frame> {
        let line = line.trim();
        if line.is_empty() {
            return Vec::new();
        }

        let request: Request = match serde_json::from_str(line) {
            Ok(request) => request,
            Err(err) => {
                warn!(client = %self.client_id, error = %err, "Invalid JSON");
                return Vec::new();
            }
        };

        let mut out = Vec::new();

        let Some(method) = request.method.clone() else {
            // A missing-method frame without an id still gets an error
            // reply, addressed to id 0.
            let id = match &request.id {
                None => Some(json!(0)),
                Some(Value::Null) => None,
                Some(other) => Some(other.clone()),
            };
            reply_error(
                &mut out,
                id.as_ref(),
                error_code::INVALID_REQUEST,
                "No method specified",
            );
            return out;
        };

        self.services
            .stats
            .lock()
            .record_method(Direction::MinerToPool, &method, unix_now());

        // Null ids mark notifications: handlers run but replies are
        // suppressed.
        let id = request.id.clone().filter(|v| !v.is_null());
        let id = id.as_ref();
        let params = request.params_list();

        match Method::from_str(&method) {
            Ok(Method::Subscribe) => self.handle_subscribe(id, &mut out),
            Ok(Method::Authorize) => self.handle_authorize(id, params, &mut out),
            Ok(Method::Submit) => self.handle_submit(id, params, &mut out).await,
            Ok(Method::Configure) => self.handle_configure(id, params, &mut out),
            Ok(Method::SuggestDifficulty) => {
                self.handle_suggest_difficulty(id, params, &mut out)
            }
            Ok(Method::SuggestTarget) => {
                // Acknowledged, not used; re-assert the current difficulty.
                out.push(set_difficulty_frame(self.difficulty));
                reply(&mut out, id, json!(true));
            }
            Ok(Method::ExtranonceSubscribe) => reply(&mut out, id, json!(true)),
            Ok(Method::MultiVersion) => reply(&mut out, id, json!(true)),
            Ok(Method::GetTransactions) => reply(&mut out, id, json!([])),
            Err(_) => {
                warn!(client = %self.client_id, method = %method, "Unknown method");
                reply_error(
                    &mut out,
                    id,
                    error_code::METHOD_NOT_FOUND,
                    &format!("Method '{method}' not found"),
                );
            }
        }

        out
    }

    fn handle_subscribe(&mut self, id: Option<&Value>, out: &mut Vec<Frame>) {
        let subscription_id = Uuid::new_v4().to_string();
        let extranonce1 = self.services.next_extranonce1();
        self.subscription_id = Some(subscription_id.clone());
        self.extranonce1 = Some(extranonce1);

        reply(
            out,
            id,
            json!([
                [
                    [messages::SET_DIFFICULTY, subscription_id],
                    [messages::NOTIFY, subscription_id],
                ],
                extranonce1.to_string(),
                ExtraNonce2::SIZE,
            ]),
        );

        out.push(set_difficulty_frame(self.difficulty));

        if let Some(job) = self.services.jobs.lock().latest() {
            out.push(Frame::Notification {
                method: messages::NOTIFY,
                line: messages::notify_line(&job, messages::current_ntime(), true),
            });
        } else {
            warn!(client = %self.client_id, "No job available at subscribe");
        }

        info!(client = %self.client_id, extranonce1 = %extranonce1, "Client subscribed");
    }

    fn handle_authorize(&mut self, id: Option<&Value>, params: &[Value], out: &mut Vec<Frame>) {
        let (Some(username), Some(_password)) = (
            params.first().and_then(Value::as_str),
            params.get(1),
        ) else {
            reply_error(out, id, error_code::INVALID_PARAMS, "Invalid params");
            return;
        };

        // Solo pool: any credentials are accepted.
        self.worker_name = Some(username.to_string());
        self.authorized = true;
        self.authorized_flag.store(true, Ordering::Relaxed);
        self.services
            .stats
            .lock()
            .worker_connected(username, unix_now());

        info!(client = %self.client_id, worker = username, "Authorized worker");
        reply(out, id, json!(true));
    }

    async fn handle_submit(&mut self, id: Option<&Value>, params: &[Value], out: &mut Vec<Frame>) {
        if !self.authorized {
            reply_error(out, id, error_code::UNAUTHORIZED, "Unauthorized worker");
            return;
        }
        let Some(extranonce1) = self.extranonce1 else {
            reply_error(out, id, error_code::OTHER, "Not subscribed");
            return;
        };
        if params.len() < 5 {
            reply_error(out, id, error_code::INVALID_PARAMS, "Invalid params");
            return;
        }

        let worker = params[0].as_str().unwrap_or("unknown").to_string();
        let Some(job_id) = params[1].as_str().map(JobId::from) else {
            reply_error(out, id, error_code::INVALID_PARAMS, "Invalid params");
            return;
        };

        // Every submit feeds the adjuster, regardless of what the
        // validator makes of the share; a difficulty change goes out
        // before the reply. The share itself is still judged against the
        // difficulty it arrived under.
        let now = unix_now();
        let difficulty = self.difficulty;
        let (changed, new_difficulty) = self
            .services
            .vardiff
            .lock()
            .record_share(&self.client_id, now);
        if changed {
            self.difficulty = new_difficulty;
            out.push(set_difficulty_frame(new_difficulty));
        }

        // Wire-value parsing enforces the 4-byte field widths.
        let parsed = (|| {
            let extranonce2 = ExtraNonce2::from_str(params[2].as_str()?).ok()?;
            let ntime = HeaderTime::from_str(params[3].as_str()?).ok()?;
            let nonce = Nonce::from_str(params[4].as_str()?).ok()?;
            Some((extranonce2, ntime, nonce))
        })();
        let Some((extranonce2, ntime, nonce)) = parsed else {
            debug!(client = %self.client_id, "Malformed share fields");
            self.services
                .stats
                .lock()
                .add_share(&worker, ShareKind::Invalid, difficulty, now);
            reply_error(out, id, error_code::OTHER, "Malformed share");
            return;
        };

        let result = share::process_submission(
            &self.services,
            &job_id,
            extranonce1,
            extranonce2,
            ntime,
            nonce,
            difficulty,
        )
        .await;

        match result {
            Ok(verdict) => {
                let mut stats = self.services.stats.lock();
                stats.add_share(&worker, ShareKind::Valid, difficulty, now);
                if let ShareVerdict::Block {
                    accepted,
                    reject_reason,
                    hash,
                    height,
                } = verdict
                {
                    if accepted {
                        stats.add_block(&worker, height, &hash, now);
                    } else {
                        warn!(
                            client = %self.client_id,
                            height,
                            reason = reject_reason.as_deref().unwrap_or("unknown"),
                            "Found block was rejected"
                        );
                    }
                } else {
                    info!(
                        client = %self.client_id,
                        worker = %worker,
                        difficulty,
                        "Valid share"
                    );
                }
                drop(stats);

                reply(out, id, json!(true));
            }
            Err(ShareError::StaleJob(job_id)) => {
                debug!(client = %self.client_id, job = %job_id, "Stale share");
                self.services
                    .stats
                    .lock()
                    .add_share(&worker, ShareKind::Stale, difficulty, now);
                reply_error(out, id, error_code::STALE_JOB, "Stale job");
            }
            Err(ShareError::LowDifficulty) => {
                self.services
                    .stats
                    .lock()
                    .add_share(&worker, ShareKind::Invalid, difficulty, now);
                reply_error(out, id, error_code::LOW_DIFFICULTY, "Low difficulty share");
            }
        }
    }

    fn handle_configure(&mut self, id: Option<&Value>, params: &[Value], out: &mut Vec<Frame>) {
        let mut result = serde_json::Map::new();

        match params.first() {
            // Extension list plus a parameter object, the common miner form.
            Some(Value::Array(names)) => {
                let ext_params = params.get(1).cloned().unwrap_or_else(|| json!({}));
                for name in names.iter().filter_map(Value::as_str) {
                    result.insert(name.to_string(), json!(true));
                    self.extensions.insert(name.to_string(), ext_params.clone());
                }
            }
            // A bare object of extension -> parameters.
            Some(Value::Object(extensions)) => {
                for (name, ext_params) in extensions {
                    result.insert(name.clone(), json!(true));
                    self.extensions.insert(name.clone(), ext_params.clone());
                }
            }
            _ => {}
        }

        debug!(client = %self.client_id, extensions = result.len(), "Configured");
        reply(out, id, Value::Object(result));
    }

    fn handle_suggest_difficulty(
        &mut self,
        id: Option<&Value>,
        params: &[Value],
        out: &mut Vec<Frame>,
    ) {
        if let Some(suggested) = params.first().and_then(Value::as_f64) {
            let (_, difficulty) = self
                .services
                .vardiff
                .lock()
                .suggest_difficulty(&self.client_id, suggested);
            self.difficulty = difficulty;
            out.push(set_difficulty_frame(difficulty));
        } else {
            warn!(client = %self.client_id, "Invalid difficulty suggestion");
        }

        reply(out, id, json!(true));
    }
}
