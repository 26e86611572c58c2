//! Shared helpers for integration tests: a minimal scripted HTTP
//! server and a scripted scraper.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use twmd::error::{Error, Result};
use twmd::media::MediaItem;
use twmd::scraper::{FetchOptions, MediaScraper};
use twmd::session::Session;

/// Scripted status/body pairs per path; the last entry repeats.
pub type Routes = HashMap<String, Vec<(u16, &'static str)>>;

pub struct StubServer {
    pub addr: SocketAddr,
    hits: Arc<Mutex<HashMap<String, usize>>>,
}

impl StubServer {
    pub async fn start(routes: Routes) -> StubServer {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits: Arc<Mutex<HashMap<String, usize>>> = Arc::new(Mutex::new(HashMap::new()));

        let hit_counter = Arc::clone(&hits);
        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                let routes = routes.clone();
                let hit_counter = Arc::clone(&hit_counter);
                tokio::spawn(async move {
                    let mut buffer = vec![0u8; 4096];
                    let mut request = Vec::new();
                    loop {
                        let Ok(n) = socket.read(&mut buffer).await else {
                            return;
                        };
                        if n == 0 {
                            return;
                        }
                        request.extend_from_slice(&buffer[..n]);
                        if request.windows(4).any(|w| w == b"\r\n\r\n") {
                            break;
                        }
                    }

                    let head = String::from_utf8_lossy(&request);
                    let path = head
                        .lines()
                        .next()
                        .and_then(|line| line.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();

                    let hit = {
                        let mut hits = hit_counter.lock().unwrap();
                        let count = hits.entry(path.clone()).or_insert(0);
                        let current = *count;
                        *count += 1;
                        current
                    };

                    let (status, body) = routes
                        .get(&path)
                        .map(|script| script[hit.min(script.len() - 1)])
                        .unwrap_or((404, "not found"));

                    let reason = match status {
                        200 => "OK",
                        404 => "Not Found",
                        500 => "Internal Server Error",
                        _ => "Status",
                    };
                    let response = format!(
                        "HTTP/1.1 {} {}\r\nContent-Type: application/octet-stream\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        reason,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        StubServer { addr, hits }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn hits(&self, path: &str) -> usize {
        *self.hits.lock().unwrap().get(path).unwrap_or(&0)
    }
}

/// One scripted reply of the stub scraper.
pub enum StubFetch {
    Items(Vec<MediaItem>),
    Fail(&'static str),
}

/// Scraper whose `fetch_user_media` pops scripted replies in order.
pub struct StubScraper {
    replies: VecDeque<StubFetch>,
    pub closed: Arc<Mutex<bool>>,
}

impl StubScraper {
    pub fn new(replies: Vec<StubFetch>) -> (Box<Self>, Arc<Mutex<bool>>) {
        let closed = Arc::new(Mutex::new(false));
        (
            Box::new(Self {
                replies: replies.into(),
                closed: Arc::clone(&closed),
            }),
            closed,
        )
    }
}

#[async_trait]
impl MediaScraper for StubScraper {
    async fn initialize(&mut self, _session: &Session) -> Result<()> {
        Ok(())
    }

    async fn fetch_user_media(
        &mut self,
        username: &str,
        _options: &FetchOptions,
    ) -> Result<Vec<MediaItem>> {
        match self.replies.pop_front() {
            Some(StubFetch::Items(items)) => Ok(items),
            Some(StubFetch::Fail(message)) => Err(Error::Scrape(message.to_string())),
            None => Err(Error::Internal(format!(
                "stub scraper exhausted at {}",
                username
            ))),
        }
    }

    async fn close(&mut self) {
        *self.closed.lock().unwrap() = true;
    }
}
