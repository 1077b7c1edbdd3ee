use async_trait::async_trait;
use futures::future::join_all;
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tokio::sync::{Mutex, RwLock, oneshot};
use tokio::time::{Duration, interval, timeout};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::identity::PeerId;
use crate::routing::{RecordStore, RecordValidator, Routing, prefer_incoming};
use crate::utils::{IpfsError, NodeLogger, Result, ensure_active, until_cancelled};
use crate::{log_debug, log_info, log_warn};

use super::contact::Contact;
use super::node_id::NodeId;
use super::routing_table::{Insert, K, RoutingTable};
use super::rpc::DhtMessage;

/// Parallel queries per lookup round.
const ALPHA: usize = 3;
const MAX_LOOKUP_ROUNDS: usize = 3;
const MAX_DATAGRAM: usize = 65536;

#[derive(Debug, Clone)]
pub struct DhtConfig {
    pub listen_port: u16,
    pub bootstrap: Vec<SocketAddr>,
    /// Upper bound on waiting for any single peer's answer.
    pub query_timeout: Duration,
    /// Peers a published record is pushed to.
    pub replication: usize,
    pub stale_after: Duration,
    pub maintenance_interval: Duration,
}

impl Default for DhtConfig {
    fn default() -> Self {
        Self {
            listen_port: 4001,
            bootstrap: Vec::new(),
            query_timeout: Duration::from_secs(10),
            replication: K,
            stale_after: Duration::from_secs(15 * 60),
            maintenance_interval: Duration::from_secs(60),
        }
    }
}

type Pending = Mutex<HashMap<Uuid, oneshot::Sender<DhtMessage>>>;

/// UDP Kademlia node holding signed records for the naming system.
pub struct DhtNode {
    node_id: NodeId,
    local_contact: Contact,
    routing_table: RwLock<RoutingTable>,
    records: RecordStore,
    validator: Arc<dyn RecordValidator>,
    socket: UdpSocket,
    pending: Pending,
    store_lock: Mutex<()>,
    config: DhtConfig,
    cancel: CancellationToken,
    logger: NodeLogger,
}

impl DhtNode {
    pub async fn bind(
        peer_id: &PeerId,
        config: DhtConfig,
        records: RecordStore,
        validator: Arc<dyn RecordValidator>,
        cancel: CancellationToken,
        logger: NodeLogger,
    ) -> Result<Arc<Self>> {
        let node_id = NodeId::for_key(&peer_id.to_string());
        let socket = UdpSocket::bind(("0.0.0.0", config.listen_port))
            .await
            .map_err(|e| {
                IpfsError::NetworkError(format!(
                    "Failed to bind DHT socket on port {}: {}",
                    config.listen_port, e
                ))
            })?;
        let local_addr = socket.local_addr()?;

        log_info!(logger, "DHT node listening on {} with ID: {}", local_addr, node_id);

        Ok(Arc::new(Self {
            node_id,
            local_contact: Contact::new(node_id, local_addr),
            routing_table: RwLock::new(RoutingTable::new(node_id, config.stale_after)),
            records,
            validator,
            socket,
            pending: Mutex::new(HashMap::new()),
            store_lock: Mutex::new(()),
            config,
            cancel,
            logger,
        }))
    }

    /// Spawns the receive and maintenance loops; both exit when the node's
    /// token is cancelled.
    pub fn start(self: &Arc<Self>) {
        let dht = self.clone();
        tokio::spawn(async move {
            dht.listen_loop().await;
        });

        let dht = self.clone();
        tokio::spawn(async move {
            dht.maintenance_loop().await;
        });
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_contact.addr
    }

    pub async fn contact_count(&self) -> usize {
        self.routing_table.read().await.contact_count()
    }

    async fn listen_loop(&self) {
        let mut buffer = vec![0u8; MAX_DATAGRAM];

        loop {
            let received = tokio::select! {
                _ = self.cancel.cancelled() => break,
                res = self.socket.recv_from(&mut buffer) => res,
            };

            match received {
                Ok((len, from)) => {
                    if let Err(e) = self.handle_message(&buffer[..len], from).await {
                        log_warn!(self.logger, "Error handling DHT message from {}: {}", from, e);
                    }
                }
                Err(e) => {
                    log_warn!(self.logger, "DHT socket error: {}", e);
                }
            }
        }

        log_debug!(self.logger, "DHT listener stopped");
    }

    async fn handle_message(&self, data: &[u8], from: SocketAddr) -> Result<()> {
        let message = DhtMessage::decode(data)?;
        self.learn(Contact::observed(message.sender(), from)).await;

        match message {
            DhtMessage::Ping { request_id, .. } => {
                let pong = DhtMessage::Pong {
                    request_id,
                    sender: self.local_contact.clone(),
                };
                self.send_message(&pong, from).await
            }
            DhtMessage::FindNode {
                request_id, target, ..
            } => {
                let contacts = self.routing_table.read().await.closest(&target, K);
                let response = DhtMessage::FindNodeResponse {
                    request_id,
                    sender: self.local_contact.clone(),
                    contacts,
                };
                self.send_message(&response, from).await
            }
            DhtMessage::PutValue {
                request_id,
                key,
                value,
                ..
            } => {
                let accepted = match self.validator.validate(&key, &value) {
                    Ok(()) => self.store_local(&key, &value).await.unwrap_or(false),
                    Err(e) => {
                        log_debug!(self.logger, "Rejected record for {} from {}: {}", key, from, e);
                        false
                    }
                };
                let response = DhtMessage::PutValueResponse {
                    request_id,
                    sender: self.local_contact.clone(),
                    accepted,
                };
                self.send_message(&response, from).await
            }
            DhtMessage::GetValue {
                request_id, key, ..
            } => {
                let value = self.records.get(&key).await?;
                let contacts = self
                    .routing_table
                    .read()
                    .await
                    .closest(&NodeId::for_key(&key), K);
                let response = DhtMessage::GetValueResponse {
                    request_id,
                    sender: self.local_contact.clone(),
                    value,
                    contacts,
                };
                self.send_message(&response, from).await
            }
            response => {
                if let DhtMessage::FindNodeResponse { contacts, .. }
                | DhtMessage::GetValueResponse { contacts, .. } = &response
                {
                    for contact in contacts {
                        self.learn(Contact::new(contact.node_id, contact.addr)).await;
                    }
                }
                self.complete(response).await;
                Ok(())
            }
        }
    }

    async fn learn(&self, contact: Contact) {
        if contact.node_id == self.node_id {
            return;
        }
        let addr = contact.addr;
        if let Some(Insert::Added) = self.routing_table.write().await.insert(contact) {
            log_debug!(self.logger, "Added DHT contact {}", addr);
        }
    }

    async fn complete(&self, response: DhtMessage) {
        let waiter = self.pending.lock().await.remove(&response.request_id());
        match waiter {
            Some(tx) => {
                let _ = tx.send(response);
            }
            None => log_debug!(self.logger, "Dropped late DHT response {}", response.request_id()),
        }
    }

    async fn send_message(&self, message: &DhtMessage, to: SocketAddr) -> Result<()> {
        let data = message.encode()?;
        self.socket
            .send_to(&data, to)
            .await
            .map_err(|e| IpfsError::NetworkError(format!("Failed to send to {}: {}", to, e)))?;
        Ok(())
    }

    /// Sends a request and registers a waiter for its response.
    async fn send_request(
        &self,
        message: DhtMessage,
        to: SocketAddr,
    ) -> Result<(Uuid, oneshot::Receiver<DhtMessage>)> {
        let request_id = message.request_id();
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(request_id, tx);

        if let Err(e) = self.send_message(&message, to).await {
            self.pending.lock().await.remove(&request_id);
            return Err(e);
        }
        Ok((request_id, rx))
    }

    async fn await_response(
        &self,
        request_id: Uuid,
        to: SocketAddr,
        rx: oneshot::Receiver<DhtMessage>,
    ) -> Result<DhtMessage> {
        match timeout(self.config.query_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(IpfsError::NetworkError(format!(
                "request to {} was dropped",
                to
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&request_id);
                Err(IpfsError::Timeout(format!("no answer from {}", to)))
            }
        }
    }

    async fn request(&self, message: DhtMessage, to: SocketAddr) -> Result<DhtMessage> {
        let (request_id, rx) = self.send_request(message, to).await?;
        self.await_response(request_id, to, rx).await
    }

    pub async fn ping(&self, addr: SocketAddr) -> Result<()> {
        let ping = DhtMessage::Ping {
            request_id: Uuid::new_v4(),
            sender: self.local_contact.clone(),
        };
        match self.request(ping, addr).await? {
            DhtMessage::Pong { .. } => Ok(()),
            other => Err(IpfsError::NetworkError(format!(
                "unexpected answer to ping: {:?}",
                other
            ))),
        }
    }

    /// Asks every bootstrap peer at once for contacts near our own id. Returns
    /// how many peers answered; an unreachable bootstrap peer is logged, not
    /// fatal. Takes at most one query timeout.
    pub async fn bootstrap(&self) -> usize {
        let requests = self.config.bootstrap.iter().map(|&addr| {
            let find_node = DhtMessage::FindNode {
                request_id: Uuid::new_v4(),
                sender: self.local_contact.clone(),
                target: self.node_id,
            };
            async move { (addr, self.request(find_node, addr).await) }
        });
        let gathered = until_cancelled(&self.cancel, async { Ok(join_all(requests).await) });
        let Ok(answers) = gathered.await else {
            return 0;
        };

        let mut reached = 0;
        for (addr, answer) in answers {
            match answer {
                Ok(_) => {
                    reached += 1;
                    log_info!(self.logger, "Bootstrapped DHT via {}", addr);
                }
                Err(e) => log_warn!(self.logger, "Bootstrap peer {} unreachable: {}", addr, e),
            }
        }
        reached
    }

    /// Stores `value` locally if it beats what we hold. Runs to completion once
    /// entered.
    async fn store_local(&self, key: &str, value: &[u8]) -> Result<bool> {
        let _guard = self.store_lock.lock().await;
        let current = self.records.get(key).await?;
        if !prefer_incoming(self.validator.as_ref(), key, current, value)? {
            return Ok(false);
        }
        self.records.put(key, value).await?;
        Ok(true)
    }

    /// Stores locally, then pushes the record to the closest peers. Returns
    /// the number of peers that accepted it.
    ///
    /// Cancellation is only honored before the local write and while waiting
    /// for acknowledgements; datagrams already sent are not recalled.
    pub async fn put_value(
        &self,
        cancel: &CancellationToken,
        key: &str,
        value: &[u8],
    ) -> Result<usize> {
        ensure_active(cancel)?;
        self.validator.validate(key, value)?;
        if !self.store_local(key, value).await? {
            return Err(IpfsError::InvalidRecord(format!(
                "a newer record is already stored for {}",
                key
            )));
        }

        let closest = self
            .routing_table
            .read()
            .await
            .closest(&NodeId::for_key(key), self.config.replication);
        if closest.is_empty() {
            log_debug!(self.logger, "Stored {} locally, no peers to replicate to", key);
            return Ok(0);
        }

        let mut waiting = Vec::with_capacity(closest.len());
        for contact in &closest {
            let put = DhtMessage::PutValue {
                request_id: Uuid::new_v4(),
                sender: self.local_contact.clone(),
                key: key.to_string(),
                value: value.to_vec(),
            };
            match self.send_request(put, contact.addr).await {
                Ok((request_id, rx)) => waiting.push((request_id, contact.addr, rx)),
                Err(e) => log_warn!(self.logger, "Failed to replicate {} to {}: {}", key, contact.addr, e),
            }
        }

        let acks = until_cancelled(cancel, async {
            let answers = join_all(
                waiting
                    .into_iter()
                    .map(|(id, addr, rx)| self.await_response(id, addr, rx)),
            )
            .await;
            Ok(answers)
        })
        .await?;

        let accepted = acks
            .iter()
            .filter(|a| matches!(a, Ok(DhtMessage::PutValueResponse { accepted: true, .. })))
            .count();
        if accepted == 0 {
            return Err(IpfsError::NetworkError(format!(
                "none of {} peers accepted the record for {}",
                closest.len(),
                key
            )));
        }

        log_debug!(self.logger, "Replicated {} to {}/{} peers", key, accepted, closest.len());
        Ok(accepted)
    }

    /// Local record plus up to three rounds of parallel queries to the closest
    /// unqueried peers. `Timeout` only when every queried peer timed out.
    pub async fn get_value(&self, cancel: &CancellationToken, key: &str) -> Result<Vec<u8>> {
        ensure_active(cancel)?;
        let target = NodeId::for_key(key);
        let mut candidates = Vec::new();

        if let Some(local) = self.records.get(key).await? {
            if self.validator.validate(key, &local).is_ok() {
                candidates.push(local);
            }
        }

        let mut queried: HashSet<NodeId> = HashSet::new();
        let mut answered = 0usize;
        let mut timed_out = 0usize;

        for _ in 0..MAX_LOOKUP_ROUNDS {
            let round: Vec<Contact> = self
                .routing_table
                .read()
                .await
                .closest(&target, K)
                .into_iter()
                .filter(|c| !queried.contains(&c.node_id))
                .take(ALPHA)
                .collect();
            if round.is_empty() {
                break;
            }

            let requests = round.iter().map(|contact| {
                let get = DhtMessage::GetValue {
                    request_id: Uuid::new_v4(),
                    sender: self.local_contact.clone(),
                    key: key.to_string(),
                };
                self.request(get, contact.addr)
            });
            let responses = until_cancelled(cancel, async { Ok(join_all(requests).await) }).await?;
            queried.extend(round.iter().map(|c| c.node_id));

            let mut found = false;
            for response in responses {
                match response {
                    Ok(DhtMessage::GetValueResponse { value, .. }) => {
                        answered += 1;
                        if let Some(value) = value {
                            if self.validator.validate(key, &value).is_ok() {
                                candidates.push(value);
                                found = true;
                            }
                        }
                    }
                    Ok(_) => answered += 1,
                    Err(IpfsError::Timeout(_)) => timed_out += 1,
                    Err(e) => log_debug!(self.logger, "DHT query for {} failed: {}", key, e),
                }
            }
            if found {
                break;
            }
        }

        if candidates.is_empty() {
            if timed_out > 0 && answered == 0 {
                return Err(IpfsError::Timeout(format!(
                    "{} peers did not answer for {}",
                    timed_out, key
                )));
            }
            return Err(IpfsError::NotFound(key.to_string()));
        }

        let best = self.validator.select(key, &candidates)?;
        let value = candidates.swap_remove(best);
        if let Err(e) = self.store_local(key, &value).await {
            log_warn!(self.logger, "Failed to cache record for {}: {}", key, e);
        }
        Ok(value)
    }

    async fn maintenance_loop(&self) {
        let mut ticker = interval(self.config.maintenance_interval);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            self.pending.lock().await.retain(|_, tx| !tx.is_closed());

            let mut table = self.routing_table.write().await;
            let pruned = table.prune_stale();
            log_debug!(
                self.logger,
                "DHT maintenance: {} contacts, {} pruned",
                table.contact_count(),
                pruned
            );
        }
    }
}

/// [`Routing`] over a running [`DhtNode`].
pub struct DhtRouting {
    node: Arc<DhtNode>,
}

impl DhtRouting {
    pub fn new(node: Arc<DhtNode>) -> Self {
        Self { node }
    }

    pub fn node(&self) -> &Arc<DhtNode> {
        &self.node
    }
}

#[async_trait]
impl Routing for DhtRouting {
    async fn put_value(&self, cancel: &CancellationToken, key: &str, value: Vec<u8>) -> Result<()> {
        self.node.put_value(cancel, key, &value).await.map(|_| ())
    }

    async fn get_value(&self, cancel: &CancellationToken, key: &str) -> Result<Vec<u8>> {
        self.node.get_value(cancel, key).await
    }
}
