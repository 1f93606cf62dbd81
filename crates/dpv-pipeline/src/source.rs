//! Data sources for resource passes
//!
//! Local files are opened directly. Remote data is fetched with the shared
//! HTTP client and streamed chunk by chunk into a blocking [`Read`], so the
//! decoder never holds a whole response body in memory.

use dpv_schema::Locator;
use dpv_validation::StreamError;
use std::fmt;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Chunks buffered between the fetch task and the decoder
const CHANNEL_CHUNKS: usize = 16;

/// Where one resource's rows come from
pub enum DataSource {
    /// A local path or remote URL
    Location(Locator),
    /// Rows already available as a byte stream (e.g. an upload)
    Reader(Box<dyn Read + Send>),
}

impl DataSource {
    /// A local file
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Location(Locator::Local(path.into()))
    }

    /// Any byte stream
    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        Self::Reader(Box::new(reader))
    }

    /// Human-readable origin, for logs and error messages
    pub fn describe(&self) -> String {
        match self {
            Self::Location(locator) => locator.to_string(),
            Self::Reader(_) => "<reader>".to_string(),
        }
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Location(locator) => f.debug_tuple("Location").field(locator).finish(),
            Self::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl From<Locator> for DataSource {
    fn from(locator: Locator) -> Self {
        Self::Location(locator)
    }
}

impl From<PathBuf> for DataSource {
    fn from(path: PathBuf) -> Self {
        Self::path(path)
    }
}

/// Opens data sources, fetching remote ones with a shared HTTP client
#[derive(Debug, Clone)]
pub(crate) struct SourceOpener {
    client: reqwest::Client,
    fetch_timeout: Duration,
}

impl SourceOpener {
    pub(crate) fn new(client: reqwest::Client, fetch_timeout: Duration) -> Self {
        Self {
            client,
            fetch_timeout,
        }
    }

    /// Open `source` for the resource named `resource`.
    ///
    /// The returned reader may block; drive it from a blocking task.
    pub(crate) async fn open(
        &self,
        resource: &str,
        source: DataSource,
    ) -> Result<Box<dyn Read + Send>, StreamError> {
        let location = match source {
            DataSource::Reader(reader) => return Ok(reader),
            DataSource::Location(location) => location,
        };
        let open_error = |message: String| StreamError::Open {
            resource: resource.to_string(),
            location: location.to_string(),
            message,
        };

        match &location {
            Locator::Local(path) => {
                trace!("Opening data file: {:?}", path);
                let file = tokio::fs::File::open(path)
                    .await
                    .map_err(|e| open_error(e.to_string()))?;
                Ok(Box::new(file.into_std().await))
            }
            Locator::Remote(url) => {
                debug!(%url, resource, "Fetching remote data");
                let response =
                    tokio::time::timeout(self.fetch_timeout, self.client.get(url.clone()).send())
                        .await
                        .map_err(|_| open_error(format!("timed out after {:?}", self.fetch_timeout)))?
                        .and_then(reqwest::Response::error_for_status)
                        .map_err(|e| open_error(e.to_string()))?;
                Ok(Box::new(ChannelReader::spawn(response)))
            }
        }
    }
}

/// Blocking reader over body chunks delivered by an async fetch task
struct ChannelReader {
    chunks: mpsc::Receiver<io::Result<Vec<u8>>>,
    current: Vec<u8>,
    offset: usize,
}

impl ChannelReader {
    fn new(chunks: mpsc::Receiver<io::Result<Vec<u8>>>) -> Self {
        Self {
            chunks,
            current: Vec::new(),
            offset: 0,
        }
    }

    /// Pump the response body into a channel from a runtime task
    fn spawn(mut response: reqwest::Response) -> Self {
        let (tx, rx) = mpsc::channel(CHANNEL_CHUNKS);
        tokio::spawn(async move {
            loop {
                let chunk = match response.chunk().await {
                    Ok(Some(chunk)) => Ok(chunk.to_vec()),
                    Ok(None) => break,
                    Err(e) => Err(io::Error::other(e)),
                };
                let failed = chunk.is_err();
                // Receiver dropped: the decoder stopped early
                if tx.send(chunk).await.is_err() || failed {
                    break;
                }
            }
        });
        Self::new(rx)
    }
}

impl Read for ChannelReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        while self.offset >= self.current.len() {
            match self.chunks.blocking_recv() {
                Some(chunk) => {
                    self.current = chunk?;
                    self.offset = 0;
                }
                None => return Ok(0),
            }
        }

        let n = buf.len().min(self.current.len() - self.offset);
        buf[..n].copy_from_slice(&self.current[self.offset..self.offset + n]);
        self.offset += n;
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_reader_joins_chunks() {
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(Ok(b"id,na".to_vec())).unwrap();
        tx.blocking_send(Ok(Vec::new())).unwrap();
        tx.blocking_send(Ok(b"me\n1,Alice\n".to_vec())).unwrap();
        drop(tx);

        let mut text = String::new();
        ChannelReader::new(rx).read_to_string(&mut text).unwrap();
        assert_eq!(text, "id,name\n1,Alice\n");
    }

    #[test]
    fn test_channel_reader_surfaces_fetch_error() {
        let (tx, rx) = mpsc::channel(4);
        tx.blocking_send(Ok(b"id\n".to_vec())).unwrap();
        tx.blocking_send(Err(io::Error::other("connection reset"))).unwrap();
        drop(tx);

        let mut text = String::new();
        let err = ChannelReader::new(rx).read_to_string(&mut text).unwrap_err();
        assert_eq!(err.to_string(), "connection reset");
    }

    #[test]
    fn test_describe_source() {
        assert_eq!(DataSource::path("data/people.csv").describe(), "data/people.csv");
        assert_eq!(DataSource::reader(&b"id\n"[..]).describe(), "<reader>");
    }

    #[tokio::test]
    async fn test_open_missing_file_names_resource() {
        let opener = SourceOpener::new(reqwest::Client::new(), Duration::from_secs(1));
        let Err(err) = opener
            .open("people", DataSource::path("/nonexistent/people.csv"))
            .await
        else {
            panic!("expected open failure");
        };
        assert_eq!(err.resource(), "people");
        assert!(matches!(err, StreamError::Open { .. }));
    }
}
