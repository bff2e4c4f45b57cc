use std::future::Future;
use std::time::Duration;

use futures::future::join_all;
use futures::StreamExt;
use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_stream::wrappers::ReceiverStream;
use tonic::async_trait;
use tonic::codec::CompressionEncoding;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::ChangeEvent;
use super::EventType;
use super::KeyRange;
use super::KeyValue;
use super::KvStore;
use super::Snapshot;
use super::WatchBatch;
use super::WatchStream;
use crate::proto::etcdserverpb::kv_client::KvClient;
use crate::proto::etcdserverpb::watch_client::WatchClient;
use crate::proto::etcdserverpb::watch_request::RequestUnion;
use crate::proto::etcdserverpb::PutRequest;
use crate::proto::etcdserverpb::RangeRequest;
use crate::proto::etcdserverpb::WatchCreateRequest;
use crate::proto::etcdserverpb::WatchRequest;
use crate::proto::etcdserverpb::WatchResponse;
use crate::proto::mvccpb;
use crate::utils::ScopedTimer;
use crate::ClientConfig;
use crate::Error;
use crate::NetworkError;
use crate::Result;

/// [`KvStore`] backed by an etcd v3 cluster.
///
/// Holds one gRPC channel per reachable endpoint. Tonic's `Channel` is
/// reference-counted and multiplexed, so every call simply clones one.
#[derive(Clone, Debug)]
pub struct EtcdClient {
    channels: Vec<Channel>,
    config: ClientConfig,
}

impl EtcdClient {
    /// Dials every endpoint in `config.endpoints` in parallel.
    ///
    /// Endpoints that fail to connect within `connect_timeout` are logged and
    /// skipped. Fails only when none of them answered.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        if config.endpoints.is_empty() {
            return Err(NetworkError::EmptyEndpoints.into());
        }

        let attempts = config
            .endpoints
            .iter()
            .map(|addr| Self::create_channel(addr, &config));
        let results = join_all(attempts).await;

        let mut channels = Vec::with_capacity(results.len());
        for (addr, result) in config.endpoints.iter().zip(results) {
            match result {
                Ok(channel) => channels.push(channel),
                Err(e) => warn!(endpoint = %addr, error = %e, "endpoint unreachable"),
            }
        }

        if channels.is_empty() {
            return Err(NetworkError::Unreachable {
                endpoints: config.endpoints.clone(),
                timeout: config.connect_timeout(),
            }
            .into());
        }

        info!(connected = channels.len(), total = config.endpoints.len(), "etcd client ready");
        Ok(Self { channels, config })
    }

    async fn create_channel(
        addr: &str,
        config: &ClientConfig,
    ) -> Result<Channel> {
        let uri = normalize_endpoint(addr);
        debug!(%uri, "create_channel");

        let endpoint = Endpoint::from_shared(uri.clone())
            .map_err(|e| NetworkError::InvalidURI(format!("{uri}: {e}")))?
            .connect_timeout(config.connect_timeout())
            .tcp_keepalive(Some(Duration::from_secs(config.tcp_keepalive_in_secs)))
            .http2_keep_alive_interval(Duration::from_secs(config.http2_keep_alive_interval_in_secs))
            .keep_alive_timeout(Duration::from_secs(config.http2_keep_alive_timeout_in_secs))
            .keep_alive_while_idle(true);

        match timeout(config.connect_timeout(), endpoint.connect()).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(NetworkError::RequestTimeout {
                request_type: "connect",
                duration: config.connect_timeout(),
            }
            .into()),
        }
    }

    /// Number of endpoints that were reachable at connect time.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    // Spread calls across reachable endpoints
    fn pick_channel(&self) -> Channel {
        let mut rng = StdRng::from_entropy();
        let i = rng.gen_range(0..self.channels.len());
        self.channels[i].clone()
    }

    fn kv_client(&self) -> KvClient {
        let mut client = KvClient::new(self.pick_channel())
            .max_decoding_message_size(self.config.max_decoding_message_size)
            .max_encoding_message_size(self.config.max_encoding_message_size);
        if self.config.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        client
    }

    fn watch_client(&self) -> WatchClient {
        let mut client = WatchClient::new(self.pick_channel())
            .max_decoding_message_size(self.config.max_decoding_message_size)
            .max_encoding_message_size(self.config.max_encoding_message_size);
        if self.config.enable_compression {
            client = client
                .send_compressed(CompressionEncoding::Gzip)
                .accept_compressed(CompressionEncoding::Gzip);
        }
        client
    }

    /// Bounds a unary call by `request_timeout`.
    async fn call<T>(
        &self,
        request_type: &'static str,
        request: impl Future<Output = std::result::Result<tonic::Response<T>, tonic::Status>>,
    ) -> Result<T> {
        let duration = self.config.request_timeout();
        match timeout(duration, request).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => {
                error!(request_type, %status, "etcd request failed");
                Err(status.into())
            }
            Err(_) => Err(NetworkError::RequestTimeout { request_type, duration }.into()),
        }
    }
}

#[async_trait]
impl KvStore for EtcdClient {
    async fn get(
        &self,
        key: &[u8],
        prefix: bool,
    ) -> Result<Snapshot> {
        let _timer = ScopedTimer::new("etcd::range");

        let (key, range_end) = KeyRange::new(key, prefix).to_wire();
        let request = RangeRequest {
            key,
            range_end,
            ..Default::default()
        };

        let mut client = self.kv_client();
        let response = self.call("range", client.range(request)).await?;
        let header = response.header.ok_or(NetworkError::MissingHeader("range"))?;

        Ok(Snapshot {
            revision: header.revision,
            kvs: response.kvs.into_iter().map(KeyValue::from).collect(),
        })
    }

    async fn watch(
        &self,
        key: &[u8],
        prefix: bool,
        start_revision: i64,
    ) -> Result<WatchStream> {
        let (key, range_end) = KeyRange::new(key, prefix).to_wire();
        let create = WatchRequest {
            request_union: Some(RequestUnion::CreateRequest(WatchCreateRequest {
                key,
                range_end,
                start_revision,
                ..Default::default()
            })),
        };

        let (request_tx, request_rx) = mpsc::channel(1);
        request_tx
            .send(create)
            .await
            .map_err(|_| NetworkError::WatchRequestClosed)?;

        let mut client = self.watch_client();
        let response = self.call("watch", client.watch(ReceiverStream::new(request_rx))).await?;
        debug!(start_revision, "watch stream opened");

        // etcd tears the watch down once the request half closes, so the
        // sender lives as long as the response stream.
        let stream = response.map(move |item| {
            let _request_tx = &request_tx;
            item.map(WatchBatch::from).map_err(Error::from)
        });
        Ok(stream.boxed())
    }

    async fn put(
        &self,
        key: &[u8],
        value: &[u8],
    ) -> Result<()> {
        let _timer = ScopedTimer::new("etcd::put");

        let request = PutRequest {
            key: key.to_vec(),
            value: value.to_vec(),
            ..Default::default()
        };

        let mut client = self.kv_client();
        let response = self.call("put", client.put(request)).await?;
        debug!(revision = response.header.map(|h| h.revision), "put applied");
        Ok(())
    }
}

/// Prepends `http://` to addresses given without a scheme.
pub(crate) fn normalize_endpoint(addr: &str) -> String {
    let addr = addr.trim();
    if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{addr}")
    }
}

impl From<mvccpb::KeyValue> for KeyValue {
    fn from(kv: mvccpb::KeyValue) -> Self {
        Self {
            key: kv.key,
            value: kv.value,
            create_revision: kv.create_revision,
            mod_revision: kv.mod_revision,
            version: kv.version,
        }
    }
}

impl From<i32> for EventType {
    fn from(tag: i32) -> Self {
        match mvccpb::event::EventType::try_from(tag) {
            Ok(mvccpb::event::EventType::Put) => EventType::Put,
            Ok(mvccpb::event::EventType::Delete) => EventType::Delete,
            Err(_) => EventType::Unrecognized(tag),
        }
    }
}

impl From<mvccpb::Event> for ChangeEvent {
    fn from(event: mvccpb::Event) -> Self {
        Self {
            event_type: EventType::from(event.r#type),
            kv: event.kv.map(KeyValue::from).unwrap_or_default(),
        }
    }
}

impl From<WatchResponse> for WatchBatch {
    fn from(response: WatchResponse) -> Self {
        Self {
            revision: response.header.map(|h| h.revision).unwrap_or_default(),
            events: response.events.into_iter().map(ChangeEvent::from).collect(),
            canceled: response.canceled,
            cancel_reason: response.cancel_reason,
            compact_revision: response.compact_revision,
        }
    }
}
