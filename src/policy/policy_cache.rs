//缓存层实现
// policy_cache.rs
//
// 一个 actor 任务独占缓存、在途 fetch 表和 refresh 轮次，所有读写都经过命令通道串行化。
use super::endpoint_resolver::EndpointResolver;
use super::policy_error::PolicyError;
use super::policy_fetcher::PolicyFetcher;
use super::policy_model::{find_policy, CacheSnapshot, Endpoint, Policy, Query};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

const COMMAND_BUFFER: usize = 1024;

enum Command {
    Get {
        query: Query,
        reply: oneshot::Sender<Option<Policy>>,
    },
    Inspect {
        reply: oneshot::Sender<CacheSnapshot>,
    },
    Refresh {
        reply: oneshot::Sender<()>,
    },
    Seed {
        endpoint: Endpoint,
        policies: Vec<Policy>,
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
    // 以下由后台任务发回
    Fetched {
        endpoint: Endpoint,
        generation: u64,
        policies: Option<Vec<Policy>>,
    },
    RoundExpired {
        round: u64,
    },
}

struct Waiter {
    metric_name: String,
    reply: oneshot::Sender<Option<Policy>>,
}

struct CacheEntry {
    generation: u64,
    policies: Vec<Policy>,
}

/// The single backend call running for an endpoint, and everyone waiting on it.
struct InFlight {
    generation: u64,
    waiters: Vec<Waiter>,
    rounds: Vec<u64>,
}

struct RefreshRound {
    remaining: HashSet<Endpoint>,
    total: usize,
    refreshed: usize,
    reply: oneshot::Sender<()>,
}

pub struct PolicyCache {
    entries: HashMap<Endpoint, CacheEntry>,
    // 每个 endpoint 至多一个在途 fetch
    in_flight: HashMap<Endpoint, InFlight>,
    rounds: HashMap<u64, RefreshRound>,
    next_generation: u64,
    next_round: u64,
    fetcher: Arc<dyn PolicyFetcher>,
    resolver: Arc<dyn EndpointResolver>,
    refresh_wait: Duration,
    commands: mpsc::Receiver<Command>,
    // weak, so that in-flight fetches don't keep the cache alive
    loopback: mpsc::WeakSender<Command>,
}

/// Cloneable front door to a running [`PolicyCache`].
#[derive(Clone)]
pub struct PolicyCacheHandle {
    commands: mpsc::Sender<Command>,
}

impl PolicyCache {
    /// Starts the cache task on the current tokio runtime. The task stops once
    /// every handle is dropped or [`PolicyCacheHandle::shutdown`] is called.
    pub fn spawn(
        refresh_wait: Duration,
        fetcher: Arc<dyn PolicyFetcher>,
        resolver: Arc<dyn EndpointResolver>,
    ) -> PolicyCacheHandle {
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let cache = PolicyCache {
            entries: HashMap::new(),
            in_flight: HashMap::new(),
            rounds: HashMap::new(),
            next_generation: 0,
            next_round: 0,
            fetcher,
            resolver,
            refresh_wait,
            commands: rx,
            loopback: tx.downgrade(),
        };
        tokio::spawn(cache.run());
        PolicyCacheHandle { commands: tx }
    }

    async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::Get { query, reply } => self.handle_get(query, reply),
                Command::Inspect { reply } => {
                    let snapshot: CacheSnapshot = self
                        .entries
                        .iter()
                        .map(|(endpoint, entry)| (endpoint.clone(), entry.policies.clone()))
                        .collect();
                    let _ = reply.send(snapshot);
                }
                Command::Refresh { reply } => self.handle_refresh(reply),
                Command::Seed {
                    endpoint,
                    policies,
                    reply,
                } => {
                    self.handle_seed(endpoint, policies);
                    let _ = reply.send(());
                }
                Command::Shutdown { reply } => {
                    self.commands.close();
                    let _ = reply.send(());
                    break;
                }
                Command::Fetched {
                    endpoint,
                    generation,
                    policies,
                } => self.handle_fetched(endpoint, generation, policies),
                Command::RoundExpired { round } => {
                    if let Some(expired) = self.rounds.remove(&round) {
                        for endpoint in &expired.remaining {
                            log::warn!(
                                "[Refresh] endpoint={} keeps stale entry: no answer within {:?}",
                                endpoint,
                                self.refresh_wait
                            );
                        }
                        finish_round(round, expired);
                    }
                }
            }
        }
        log::info!("Policy cache stopped with {} endpoints", self.entries.len());
    }

    fn bump_generation(&mut self) -> u64 {
        self.next_generation += 1;
        self.next_generation
    }

    fn handle_get(&mut self, query: Query, reply: oneshot::Sender<Option<Policy>>) {
        let endpoint = match self.resolver.resolve(&query) {
            Some(endpoint) => endpoint,
            None => {
                log::debug!(
                    "No endpoint for account={} region={} metric={}",
                    query.account_id,
                    query.region,
                    query.metric_name
                );
                let _ = reply.send(None);
                return;
            }
        };

        // 缓存命中
        if let Some(entry) = self.entries.get(&endpoint) {
            let _ = reply.send(find_policy(&entry.policies, &query.metric_name));
            return;
        }

        let waiter = Waiter {
            metric_name: query.metric_name,
            reply,
        };
        if let Some(fetch) = self.in_flight.get_mut(&endpoint) {
            log::debug!("[Miss] endpoint={} joins in-flight fetch", endpoint);
            fetch.waiters.push(waiter);
            return;
        }
        log::info!("[Miss] endpoint={} dispatching fetch", endpoint);
        self.dispatch_fetch(endpoint, None).waiters.push(waiter);
    }

    /// Starts the backend call for `endpoint`. Refresh fetches are bounded by
    /// `bound`; Get-miss fetches are not.
    fn dispatch_fetch(&mut self, endpoint: Endpoint, bound: Option<Duration>) -> &mut InFlight {
        let generation = self.bump_generation();
        let fetcher = Arc::clone(&self.fetcher);
        let loopback = self.loopback.clone();
        let target = endpoint.clone();
        tokio::spawn(async move {
            let fetch = fetcher.fetch(&target);
            let outcome = match bound {
                Some(wait) => match tokio::time::timeout(wait, fetch).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(PolicyError::Timeout(wait)),
                },
                None => fetch.await,
            };
            let policies = match outcome {
                Ok(policies) => Some(policies),
                Err(e) => {
                    log::warn!("Fetch for endpoint={} failed: {}", target, e);
                    None
                }
            };
            if let Some(tx) = loopback.upgrade() {
                let _ = tx
                    .send(Command::Fetched {
                        endpoint: target,
                        generation,
                        policies,
                    })
                    .await;
            }
        });
        self.in_flight.entry(endpoint).or_insert(InFlight {
            generation,
            waiters: Vec::new(),
            rounds: Vec::new(),
        })
    }

    fn handle_fetched(&mut self, endpoint: Endpoint, generation: u64, policies: Option<Vec<Policy>>) {
        if self.in_flight.get(&endpoint).map(|fetch| fetch.generation) != Some(generation) {
            log::debug!("Ignoring superseded fetch for endpoint={}", endpoint);
            return;
        }
        let fetch = match self.in_flight.remove(&endpoint) {
            Some(fetch) => fetch,
            None => return,
        };

        let policies = match policies {
            Some(policies) => policies,
            None => {
                // 不回复等待者：由调用方自己的超时兜底，下一次 get 会重新 fetch
                if !fetch.waiters.is_empty() {
                    log::warn!(
                        "Dropping {} waiters for endpoint={} without an answer",
                        fetch.waiters.len(),
                        endpoint
                    );
                }
                self.settle(&endpoint, fetch.rounds, false);
                return;
            }
        };

        // seed 在 fetch 发出之后写入的数据更新，不被覆盖
        let superseded = self
            .entries
            .get(&endpoint)
            .map_or(false, |entry| entry.generation > generation);
        if superseded {
            log::debug!("Keeping newer entry for endpoint={} over fetched list", endpoint);
        } else {
            self.entries.insert(
                endpoint.clone(),
                CacheEntry {
                    generation,
                    policies,
                },
            );
        }
        if let Some(entry) = self.entries.get(&endpoint) {
            for waiter in fetch.waiters {
                let _ = waiter
                    .reply
                    .send(find_policy(&entry.policies, &waiter.metric_name));
            }
        }
        self.settle(&endpoint, fetch.rounds, !superseded);
    }

    /// Installs the list wholesale and answers everyone waiting on the endpoint.
    /// A fetch already in flight stays registered.
    fn handle_seed(&mut self, endpoint: Endpoint, policies: Vec<Policy>) {
        let generation = self.bump_generation();
        if let Some(fetch) = self.in_flight.get_mut(&endpoint) {
            for waiter in fetch.waiters.drain(..) {
                let _ = waiter.reply.send(find_policy(&policies, &waiter.metric_name));
            }
        }
        self.entries.insert(
            endpoint,
            CacheEntry {
                generation,
                policies,
            },
        );
    }

    fn handle_refresh(&mut self, reply: oneshot::Sender<()>) {
        let round = self.next_round;
        self.next_round += 1;
        let wait = self.refresh_wait;

        // 只刷新此刻已缓存的 endpoint；已有 fetch 在途的直接加入等待
        let snapshot: Vec<Endpoint> = self.entries.keys().cloned().collect();
        let mut remaining = HashSet::with_capacity(snapshot.len());
        for endpoint in snapshot {
            if let Some(fetch) = self.in_flight.get_mut(&endpoint) {
                log::debug!("[Refresh] endpoint={} joins in-flight fetch", endpoint);
                fetch.rounds.push(round);
            } else {
                self.dispatch_fetch(endpoint.clone(), Some(wait))
                    .rounds
                    .push(round);
            }
            remaining.insert(endpoint);
        }
        log::info!("[Refresh] round={} covers {} endpoints", round, remaining.len());

        if remaining.is_empty() {
            let _ = reply.send(());
            return;
        }
        self.rounds.insert(
            round,
            RefreshRound {
                total: remaining.len(),
                refreshed: 0,
                remaining,
                reply,
            },
        );

        // a joined Get-miss fetch has no bound of its own
        let loopback = self.loopback.clone();
        tokio::spawn(async move {
            tokio::time::sleep(wait).await;
            if let Some(tx) = loopback.upgrade() {
                let _ = tx.send(Command::RoundExpired { round }).await;
            }
        });
    }

    fn settle(&mut self, endpoint: &Endpoint, rounds: Vec<u64>, refreshed: bool) {
        for round in rounds {
            let done = match self.rounds.get_mut(&round) {
                Some(pending) => {
                    if pending.remaining.remove(endpoint) && refreshed {
                        pending.refreshed += 1;
                    }
                    pending.remaining.is_empty()
                }
                None => false,
            };
            if done {
                if let Some(finished) = self.rounds.remove(&round) {
                    finish_round(round, finished);
                }
            }
        }
    }
}

fn finish_round(round: u64, finished: RefreshRound) {
    log::info!(
        "[Refresh] round={} refreshed={} stale={}",
        round,
        finished.refreshed,
        finished.total - finished.refreshed
    );
    let _ = finished.reply.send(());
}

impl PolicyCacheHandle {
    /// Looks up the policy for `query`, fetching the endpoint on a miss.
    ///
    /// There is no internal deadline: if the backend never answers, neither
    /// does this. Use [`get_within`](Self::get_within) unless you impose your
    /// own timeout.
    pub async fn get(&self, query: Query) -> Result<Option<Policy>, PolicyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Get { query, reply }).await?;
        match rx.await {
            Ok(answer) => Ok(answer),
            // fetch 失败时等待者被丢弃，保持挂起直到调用方超时
            Err(_) => std::future::pending().await,
        }
    }

    pub async fn get_within(
        &self,
        query: Query,
        deadline: Duration,
    ) -> Result<Option<Policy>, PolicyError> {
        tokio::time::timeout(deadline, self.get(query))
            .await
            .map_err(|_| PolicyError::Timeout(deadline))?
    }

    pub async fn refresh(&self) -> Result<(), PolicyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Refresh { reply }).await?;
        rx.await.map_err(|_| PolicyError::CacheClosed)
    }

    pub async fn inspect(&self) -> Result<CacheSnapshot, PolicyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Inspect { reply }).await?;
        rx.await.map_err(|_| PolicyError::CacheClosed)
    }

    pub async fn seed(&self, endpoint: Endpoint, policies: Vec<Policy>) -> Result<(), PolicyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Seed {
            endpoint,
            policies,
            reply,
        })
        .await?;
        rx.await.map_err(|_| PolicyError::CacheClosed)
    }

    /// Stops the cache task. Every later call on any handle gets
    /// [`PolicyError::CacheClosed`].
    pub async fn shutdown(&self) -> Result<(), PolicyError> {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply }).await?;
        rx.await.map_err(|_| PolicyError::CacheClosed)
    }

    async fn send(&self, command: Command) -> Result<(), PolicyError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PolicyError::CacheClosed)
    }
}
