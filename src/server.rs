use super::*;

/// Accepts miner connections on every configured port and spawns a
/// [`Connection`] task per socket. Job broadcast rides the job manager's
/// watch channel, so the server itself only tracks the client registry.
pub(crate) struct StratumServer {
    settings: Arc<Settings>,
    jobs: Arc<JobManager>,
    vardiffs: HashMap<u16, Arc<VarDiff>>,
    share_tx: mpsc::Sender<ShareOutcome>,
    subscriptions: SubscriptionCounter,
    clients: AtomicUsize,
}

impl StratumServer {
    pub(crate) fn new(
        settings: Arc<Settings>,
        jobs: Arc<JobManager>,
        vardiffs: HashMap<u16, Arc<VarDiff>>,
        share_tx: mpsc::Sender<ShareOutcome>,
    ) -> Self {
        Self {
            settings,
            jobs,
            vardiffs,
            share_tx,
            subscriptions: SubscriptionCounter::new(),
            clients: AtomicUsize::new(0),
        }
    }

    pub(crate) async fn run(self: Arc<Self>, cancel_token: CancellationToken) -> Result {
        let mut listeners = Vec::new();

        for (&port, port_settings) in &self.settings.ports {
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .with_context(|| format!("failed to bind stratum port {port}"))?;

            info!("Stratum listening on port {port} diff {}", port_settings.diff);
            listeners.push((port, port_settings.clone(), listener));
        }

        let accept_loops = listeners
            .into_iter()
            .map(|(port, port_settings, listener)| {
                let server = self.clone();
                let cancel_token = cancel_token.clone();

                tokio::spawn(async move {
                    server.accept_loop(port, port_settings, listener, cancel_token).await
                })
            })
            .collect::<Vec<JoinHandle<()>>>();

        for accept_loop in accept_loops {
            let _ = accept_loop.await;
        }

        Ok(())
    }

    async fn accept_loop(
        self: Arc<Self>,
        port: u16,
        port_settings: PortSettings,
        listener: TcpListener,
        cancel_token: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel_token.cancelled() => {
                    info!("Shutting down stratum port {port}");
                    break;
                }
                accepted = listener.accept() => {
                    let (stream, socket_addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(err) => {
                            warn!("Accept failed on port {port}: {err}");
                            continue;
                        }
                    };

                    if let Err(err) = SockRef::from(&stream).set_keepalive(true) {
                        debug!("Failed to set keepalive for {socket_addr}: {err}");
                    }

                    if let Err(err) = stream.set_nodelay(true) {
                        debug!("Failed to set nodelay for {socket_addr}: {err}");
                    }

                    let subscription_id = self.subscriptions.next();
                    let clients = self.clients.fetch_add(1, Ordering::Relaxed) + 1;

                    info!("Client {socket_addr} connected on port {port} ({clients} total)");

                    let server = self.clone();
                    let port_diff = port_settings.diff;
                    let cancel_token = cancel_token.clone();

                    tokio::spawn(async move {
                        let (reader, writer) = stream.into_split();

                        let mut connection = Connection::new(
                            server.settings.clone(),
                            server.jobs.clone(),
                            server.vardiffs.get(&port).cloned(),
                            server.share_tx.clone(),
                            socket_addr,
                            port,
                            port_diff,
                            subscription_id,
                            reader,
                            writer,
                            cancel_token,
                        );

                        if let Err(err) = connection.serve().await {
                            debug!("Connection {socket_addr} error: {err:#}");
                        }

                        let clients = server.clients.fetch_sub(1, Ordering::Relaxed) - 1;
                        info!("Client {socket_addr} disconnected ({clients} remaining)");
                    });
                }
            }
        }
    }
}
