use std::convert::Infallible;
use std::future::Future;
use std::net;
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::Full;
use tokio::sync::oneshot;

pub struct Server {
    addr: net::SocketAddr,
    done_rx: std_mpsc::Receiver<()>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl Server {
    pub fn addr(&self) -> net::SocketAddr {
        self.addr
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if !thread::panicking() {
            self.done_rx
                .recv_timeout(Duration::from_secs(3))
                .expect("test server should not panic");
        }
    }
}

pub fn http<F, Fut>(func: F) -> Server
where
    F: Fn(http::Request<hyper::body::Incoming>) -> Fut + Clone + Send + 'static,
    Fut: Future<Output = http::Response<Full<Bytes>>> + Send + 'static,
{
    let test_name = thread::current().name().unwrap_or("<unknown>").to_string();

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("new rt");
    let listener = rt.block_on(async {
        tokio::net::TcpListener::bind(&net::SocketAddr::from(([127, 0, 0, 1], 0)))
            .await
            .unwrap()
    });
    let addr = listener.local_addr().unwrap();

    let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
    let (done_tx, done_rx) = std_mpsc::channel();
    let tname = format!("test({})-support-server", test_name);

    thread::Builder::new()
        .name(tname)
        .spawn(move || {
            rt.block_on(async move {
                loop {
                    tokio::select! {
                        _ = &mut shutdown_rx => break,
                        accepted = listener.accept() => {
                            let (io, _) = accepted.expect("accepted");
                            let func = func.clone();
                            let svc = hyper::service::service_fn(move |req| {
                                let fut = func(req);
                                async move { Ok::<_, Infallible>(fut.await) }
                            });
                            tokio::spawn(async move {
                                let _ = hyper::server::conn::http1::Builder::new()
                                    .serve_connection(hyper_util::rt::TokioIo::new(io), svc)
                                    .await;
                            });
                        }
                    }
                }
            });
            let _ = done_tx.send(());
        })
        .expect("thread spawn");

    Server {
        addr,
        done_rx,
        shutdown_tx: Some(shutdown_tx),
    }
}
