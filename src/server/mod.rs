//! The server: drive/user/session tables, persistence, and the TLS
//! accept loop with its worker pool.

pub mod commands;
pub mod config;
pub mod conn;
pub mod cron;
pub mod dispatch;
pub mod limiter;

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::fs;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::auth::session::{SessionList, DEFAULT_GEN_LIMIT};
use crate::auth::user::UserList;
use crate::drive::{health, marshal, Drive};
use crate::error::{Error, Result, ResponseCode};
use crate::wire::response::Status;
use crate::wire::stream::TimedStream;

use config::Config;
use limiter::RateLimiter;

/// One running server's shared state.
pub struct Server {
    config: RwLock<Config>,
    users: UserList,
    sessions: SessionList,
    drives: RwLock<HashMap<String, Arc<Drive>>>,
}

impl Server {
    /// Builds the server handle from a loaded configuration and user
    /// list. Drives are attached separately with [`Server::load_drives`].
    pub fn new(config: Config, users: UserList) -> Arc<Self> {
        Arc::new(Self {
            config: RwLock::new(config),
            users,
            sessions: SessionList::new(DEFAULT_GEN_LIMIT),
            drives: RwLock::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &RwLock<Config> {
        &self.config
    }

    pub fn users(&self) -> &UserList {
        &self.users
    }

    pub fn sessions(&self) -> &SessionList {
        &self.sessions
    }

    pub async fn get_drive(&self, name: &str) -> Result<Arc<Drive>> {
        self.drives
            .read()
            .await
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriveNotFound(name.to_owned()))
    }

    pub async fn drive_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.drives.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Registers a drive in the table and the config.
    pub async fn insert_drive(
        &self,
        name: &str,
        drive: Arc<Drive>,
        drive_file: &str,
    ) -> Result<()> {
        let mut drives = self.drives.write().await;
        let mut config = self.config.write().await;
        if drives.contains_key(name) || config.drive_files.contains_key(name) {
            return Err(Error::DriveAlreadyExists(name.to_owned()));
        }
        config.drive_files.insert(name.to_owned(), drive_file.to_owned());
        config.dirty = true;
        drives.insert(name.to_owned(), drive);
        Ok(())
    }

    /// Drops a drive from the table and the config. Host data and the
    /// drive file are left on disk.
    pub async fn remove_drive(&self, name: &str) -> Result<()> {
        let mut drives = self.drives.write().await;
        let mut config = self.config.write().await;
        if drives.remove(name).is_none() {
            return Err(Error::DriveNotFound(name.to_owned()));
        }
        config.drive_files.remove(name);
        config.dirty = true;
        Ok(())
    }

    pub async fn rename_drive(&self, old_name: &str, new_name: &str) -> Result<()> {
        let mut drives = self.drives.write().await;
        let mut config = self.config.write().await;
        if drives.contains_key(new_name) || config.drive_files.contains_key(new_name) {
            return Err(Error::DriveAlreadyExists(new_name.to_owned()));
        }
        let drive = drives
            .remove(old_name)
            .ok_or_else(|| Error::DriveNotFound(old_name.to_owned()))?;
        drive.set_name(new_name).await;
        drive.set_dirty(true).await;
        drives.insert(new_name.to_owned(), drive);
        if let Some(file) = config.drive_files.remove(old_name) {
            config.drive_files.insert(new_name.to_owned(), file);
        }
        config.dirty = true;
        Ok(())
    }

    /// Loads every drive named by the config from its drive file.
    pub async fn load_drives(self: &Arc<Self>) -> Result<()> {
        let drive_files = self.config.read().await.drive_files.clone();
        for (name, file) in drive_files {
            let bytes = fs::read(&file)
                .await
                .map_err(|_| Error::DriveFileMissing(file.clone().into()))?;
            let drive = marshal::unmarshal_drive(&bytes).await?;
            // the config key is authoritative for the name
            drive.set_name(&name).await;
            self.drives.write().await.insert(name.clone(), Arc::new(drive));
            info!(drive = %name, "drive loaded");
        }
        Ok(())
    }

    /// Writes one drive to its drive file and clears its dirty bit.
    pub async fn save_drive(&self, name: &str) -> Result<()> {
        let file = self
            .config
            .read()
            .await
            .drive_files
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DriveNotFound(name.to_owned()))?;
        let drive = self.get_drive(name).await?;
        let bytes = marshal::marshal_drive(&drive).await?;
        let tmp = format!("{file}.tmp");
        fs::write(&tmp, &bytes).await?;
        fs::rename(&tmp, &file).await?;
        drive.set_dirty(false).await;
        Ok(())
    }

    /// Persists every dirty drive plus the manifest when dirty.
    pub async fn persist(&self) -> Result<()> {
        for name in self.drive_names().await {
            let drive = self.get_drive(name.as_str()).await?;
            if drive.is_dirty().await {
                self.save_drive(&name).await?;
                info!(drive = %name, "drive persisted");
            }
        }

        let config_dirty = self.config.read().await.dirty;
        if config_dirty || self.users.is_dirty().await {
            let config = self.config.read().await.clone();
            config::save_manifest(&config, &self.users).await?;
            self.config.write().await.dirty = false;
            self.users.set_dirty(false).await;
            info!("server manifest persisted");
        }
        Ok(())
    }

    /// One main-cron pass: reconcile drive health, then persist. Errors
    /// are logged, never propagated.
    pub async fn maintenance(&self) {
        for name in self.drive_names().await {
            match self.get_drive(&name).await {
                Ok(drive) => match health::reconcile(&drive).await {
                    Ok(0) => {}
                    Ok(count) => warn!(drive = %name, count, "host divergences detected"),
                    Err(err) => warn!(drive = %name, error = %err, "health check failed"),
                },
                Err(_) => continue,
            }
        }
        if let Err(err) = self.persist().await {
            error!(error = %err, "persistence pass failed");
        }
    }
}

enum Job {
    Conn(TcpStream, SocketAddr),
    Stop,
}

/// Runs the accept loop until `shutdown` fires, then drains the workers
/// and performs a final persistence pass.
pub async fn serve(server: Arc<Server>, mut shutdown: watch::Receiver<bool>) -> Result<()> {
    let (host, port, backlog, num_workers, timeout, rate_interval, rate_burst, tls_config) = {
        let config = server.config.read().await;
        config.validate()?;
        (
            config.host.clone(),
            config.port,
            config.backlog as usize,
            config.num_workers as usize,
            config.timeout,
            config.rate_limit_interval,
            config.max_limit_events,
            config.load_tls()?,
        )
    };

    let acceptor = TlsAcceptor::from(Arc::new(tls_config));
    let listener = TcpListener::bind((host.as_str(), port)).await?;
    info!(%host, port, num_workers, "listening");

    let (job_tx, job_rx) = async_channel::bounded::<Job>(backlog.max(1));
    let (limit_tx, limit_rx) = async_channel::bounded::<Job>(backlog.max(1));
    let limiter = RateLimiter::new(rate_interval, rate_burst);

    let mut workers: Vec<JoinHandle<()>> = Vec::with_capacity(num_workers + 1);
    for _ in 0..num_workers {
        workers.push(spawn_worker(
            Arc::clone(&server),
            job_rx.clone(),
            acceptor.clone(),
            timeout,
        ));
    }
    workers.push(spawn_limit_worker(limit_rx.clone(), acceptor.clone(), timeout));

    let (cron_stop_tx, cron_stop_rx) = watch::channel(false);
    let session_interval = server.config.read().await.session_interval;
    let main_interval = server.config.read().await.main_interval;
    let session_cron =
        cron::spawn_session_cron(Arc::clone(&server), session_interval, cron_stop_rx.clone());
    let main_cron =
        cron::spawn_main_cron(Arc::clone(&server), main_interval, cron_stop_rx.clone());

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (tcp, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(err) => {
                        warn!(error = %err, "accept failed");
                        continue;
                    }
                };
                if limiter.check(addr.ip()) {
                    if job_tx.send(Job::Conn(tcp, addr)).await.is_err() {
                        break;
                    }
                } else {
                    debug!(%addr, "rate limited");
                    if limit_tx.send(Job::Conn(tcp, addr)).await.is_err() {
                        break;
                    }
                }
            }
            _ = shutdown.changed() => break,
        }
    }

    info!("shutting down");
    drop(listener);
    for _ in 0..num_workers {
        let _ = job_tx.send(Job::Stop).await;
    }
    let _ = limit_tx.send(Job::Stop).await;
    let _ = cron_stop_tx.send(true);
    for worker in workers {
        let _ = worker.await;
    }
    let _ = session_cron.await;
    let _ = main_cron.await;

    server.persist().await?;
    info!("shutdown complete");
    Ok(())
}

fn spawn_worker(
    server: Arc<Server>,
    jobs: async_channel::Receiver<Job>,
    acceptor: TlsAcceptor,
    timeout: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(job) = jobs.recv().await {
            match job {
                Job::Stop => break,
                Job::Conn(tcp, addr) => match acceptor.accept(tcp).await {
                    Ok(tls) => {
                        let mut stream = TimedStream::new(tls, timeout);
                        conn::handle(Arc::clone(&server), &mut stream).await;
                    }
                    Err(err) => debug!(%addr, error = %err, "tls handshake failed"),
                },
            }
        }
    })
}

/// The dedicated worker answering rate-limited connections with a
/// code-19 rejection frame.
fn spawn_limit_worker(
    jobs: async_channel::Receiver<Job>,
    acceptor: TlsAcceptor,
    timeout: std::time::Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Ok(job) = jobs.recv().await {
            match job {
                Job::Stop => break,
                Job::Conn(tcp, addr) => match acceptor.accept(tcp).await {
                    Ok(tls) => {
                        let mut stream = TimedStream::new(tls, timeout);
                        let status = Status::from_error(&Error::RateLimited);
                        debug_assert_eq!(status.code, ResponseCode::RateLimit as u32);
                        if let Err(err) = conn::write_error_frame(&mut stream, &status).await {
                            debug!(%addr, error = %err, "failed writing rate-limit frame");
                        }
                    }
                    Err(err) => debug!(%addr, error = %err, "tls handshake failed"),
                },
            }
        }
    })
}
