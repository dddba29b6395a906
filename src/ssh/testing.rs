//! In-process SSH server and echo service used by tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use russh::keys::{self, PublicKey};
use russh::server::{self, Auth, Msg, Server as _, Session};
use russh::{Channel, MethodKind, MethodSet};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::ssh::auth::{AuthChain, KeyAuth};
use crate::ssh::session::DefaultSessionFactory;

pub(crate) const KEY_1: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/id_ed25519_1");
pub(crate) const KEY_2: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/tests/fixtures/id_ed25519_2");

/// SSH server on `127.0.0.1` that accepts the public half of one key and
/// opens every `direct-tcpip` channel it is asked for.
pub(crate) struct SshServer {
    port: u16,
    connections: Arc<AtomicUsize>,
    task: JoinHandle<()>,
}

impl SshServer {
    /// Start a server authorizing `authorized_key`. Its host key is fixture
    /// key 2.
    pub(crate) async fn start(authorized_key: &str) -> Self {
        let mut authorized = keys::load_secret_key(authorized_key, None)
            .unwrap()
            .public_key()
            .clone();
        authorized.set_comment("");

        let mut methods = MethodSet::empty();
        methods.push(MethodKind::PublicKey);
        let config = server::Config {
            auth_rejection_time: Duration::from_millis(50),
            auth_rejection_time_initial: Some(Duration::from_millis(0)),
            methods,
            keys: vec![keys::load_secret_key(KEY_2, None).unwrap()],
            ..Default::default()
        };

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let connections = Arc::new(AtomicUsize::new(0));

        let mut server = Acceptor {
            authorized: Arc::new(authorized),
            connections: connections.clone(),
        };
        let task = tokio::spawn(async move {
            let _ = server.run_on_socket(Arc::new(config), &listener).await;
        });

        Self {
            port,
            connections,
            task,
        }
    }

    pub(crate) fn port(&self) -> u16 {
        self.port
    }

    /// Number of SSH connections accepted so far.
    pub(crate) fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    /// Session factory for `127.0.0.1` on this server's port, offering
    /// `key` as user `tester` and accepting any host key.
    pub(crate) fn session_factory(&self, key: &str) -> DefaultSessionFactory {
        DefaultSessionFactory::new(
            "tester",
            self.port,
            AuthChain::new().with_key(KeyAuth::load(key).unwrap()),
        )
        .with_hostname("127.0.0.1")
        .with_strict_host_key_checking(false)
        .with_connect_timeout(Duration::from_secs(10))
    }
}

impl Drop for SshServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

struct Acceptor {
    authorized: Arc<PublicKey>,
    connections: Arc<AtomicUsize>,
}

impl server::Server for Acceptor {
    type Handler = Connection;

    fn new_client(&mut self, _peer: Option<SocketAddr>) -> Connection {
        self.connections.fetch_add(1, Ordering::SeqCst);
        Connection {
            authorized: self.authorized.clone(),
        }
    }
}

struct Connection {
    authorized: Arc<PublicKey>,
}

impl server::Handler for Connection {
    type Error = russh::Error;

    async fn auth_publickey_offered(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.check(public_key))
    }

    async fn auth_publickey(
        &mut self,
        _user: &str,
        public_key: &PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.check(public_key))
    }

    async fn channel_open_direct_tcpip(
        &mut self,
        channel: Channel<Msg>,
        host_to_connect: &str,
        port_to_connect: u32,
        _originator_address: &str,
        _originator_port: u32,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        let Ok(mut target) = TcpStream::connect((host_to_connect, port_to_connect as u16)).await
        else {
            return Ok(false);
        };
        tokio::spawn(async move {
            let mut stream = channel.into_stream();
            let _ = tokio::io::copy_bidirectional(&mut stream, &mut target).await;
        });
        Ok(true)
    }
}

impl Connection {
    fn check(&self, public_key: &PublicKey) -> Auth {
        if public_key.key_data() == self.authorized.key_data() {
            Auth::Accept
        } else {
            Auth::reject()
        }
    }
}

/// TCP service on `127.0.0.1` that writes back whatever it reads and closes
/// after the peer's EOF. Returns its port.
pub(crate) async fn echo_server() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        while let Ok((mut stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
                let _ = writer.shutdown().await;
            });
        }
    });
    port
}
