use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::stream;
use futures::Stream;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::sync::Notify;
use tonic::codec::ProstCodec;
use tonic::codegen::empty_body;
use tonic::codegen::http;
use tonic::codegen::Body;
use tonic::codegen::BoxFuture;
use tonic::codegen::Context;
use tonic::codegen::Poll;
use tonic::codegen::Service;
use tonic::codegen::StdError;
use tonic::server::Grpc;
use tonic::server::NamedService;
use tonic::server::StreamingService;
use tonic::server::UnaryService;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic::Streaming;
use tracing::debug;

use crate::proto::etcdserverpb::watch_request::RequestUnion;
use crate::proto::etcdserverpb::PutRequest;
use crate::proto::etcdserverpb::PutResponse;
use crate::proto::etcdserverpb::RangeRequest;
use crate::proto::etcdserverpb::RangeResponse;
use crate::proto::etcdserverpb::ResponseHeader;
use crate::proto::etcdserverpb::WatchCreateRequest;
use crate::proto::etcdserverpb::WatchRequest;
use crate::proto::etcdserverpb::WatchResponse;

type WatchResponseStream = Pin<Box<dyn Stream<Item = std::result::Result<WatchResponse, Status>> + Send>>;

/// Canned etcd `KV` and `Watch` services that record what they were asked.
#[derive(Default)]
pub struct FakeEtcd {
    pub range_response: RangeResponse,
    pub put_revision: i64,
    /// Sent in order on every watch stream
    pub watch_responses: Vec<WatchResponse>,
    /// Close the response stream after `watch_responses` instead of idling
    pub end_watch_stream: bool,

    pub(crate) ranges: Mutex<Vec<RangeRequest>>,
    pub(crate) puts: Mutex<Vec<PutRequest>>,
    pub(crate) watch_creates: Mutex<Vec<WatchCreateRequest>>,
    pub(crate) watch_request_closed: AtomicBool,
    pub(crate) watch_request_closed_notify: Notify,
}

impl FakeEtcd {
    pub fn ranges(&self) -> Vec<RangeRequest> {
        self.ranges.lock().clone()
    }

    pub fn puts(&self) -> Vec<PutRequest> {
        self.puts.lock().clone()
    }

    pub fn watch_creates(&self) -> Vec<WatchCreateRequest> {
        self.watch_creates.lock().clone()
    }

    /// Whether the client has closed the request half of a watch stream.
    pub fn watch_request_closed(&self) -> bool {
        self.watch_request_closed.load(Ordering::SeqCst)
    }

    pub async fn wait_for_watch_request_close(
        &self,
        max_wait: Duration,
    ) -> bool {
        let notified = self.watch_request_closed_notify.notified();
        if self.watch_request_closed() {
            return true;
        }
        tokio::time::timeout(max_wait, notified).await.is_ok() || self.watch_request_closed()
    }

    fn header(revision: i64) -> Option<ResponseHeader> {
        Some(ResponseHeader {
            revision,
            ..Default::default()
        })
    }

    async fn range(
        &self,
        request: Request<RangeRequest>,
    ) -> std::result::Result<Response<RangeResponse>, Status> {
        self.ranges.lock().push(request.into_inner());
        Ok(Response::new(self.range_response.clone()))
    }

    async fn put(
        &self,
        request: Request<PutRequest>,
    ) -> std::result::Result<Response<PutResponse>, Status> {
        let request = request.into_inner();
        if request.key.is_empty() {
            return Err(Status::invalid_argument("etcdserver: key is not provided"));
        }
        self.puts.lock().push(request);
        Ok(Response::new(PutResponse {
            header: Self::header(self.put_revision),
            prev_kv: None,
        }))
    }

    async fn watch(
        self: Arc<Self>,
        request: Request<Streaming<WatchRequest>>,
    ) -> std::result::Result<Response<WatchResponseStream>, Status> {
        let mut inbound = request.into_inner();
        match inbound.message().await? {
            Some(WatchRequest {
                request_union: Some(RequestUnion::CreateRequest(create)),
            }) => self.watch_creates.lock().push(create),
            _ => return Err(Status::invalid_argument("first watch message must be a create request")),
        }

        let state = self.clone();
        tokio::spawn(async move {
            while let Ok(Some(_)) = inbound.message().await {}
            debug!("fake etcd: watch request half closed");
            state.watch_request_closed.store(true, Ordering::SeqCst);
            state.watch_request_closed_notify.notify_waiters();
        });

        let replies = stream::iter(self.watch_responses.clone().into_iter().map(Ok));
        let outbound: WatchResponseStream = if self.end_watch_stream {
            Box::pin(replies)
        } else {
            Box::pin(replies.chain(stream::pending()))
        };
        Ok(Response::new(outbound))
    }

    /// Serves the fake on an ephemeral local port until `shutdown` fires.
    pub async fn serve(
        self: Arc<Self>,
        shutdown: oneshot::Receiver<()>,
    ) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        debug!(%addr, "starting fake etcd");

        tokio::spawn(async move {
            tonic::transport::Server::builder()
                .add_service(KvServer(self.clone()))
                .add_service(WatchServer(self))
                .serve_with_incoming_shutdown(tokio_stream::wrappers::TcpListenerStream::new(listener), async {
                    shutdown.await.ok();
                })
                .await
                .unwrap();
        });

        addr
    }
}

fn unimplemented_response() -> http::Response<tonic::body::BoxBody> {
    let mut response = http::Response::new(empty_body());
    let headers = response.headers_mut();
    headers.insert("grpc-status", (tonic::Code::Unimplemented as i32).into());
    headers.insert(http::header::CONTENT_TYPE, tonic::metadata::GRPC_CONTENT_TYPE);
    response
}

#[derive(Clone)]
struct KvServer(Arc<FakeEtcd>);

impl NamedService for KvServer {
    const NAME: &'static str = "etcdserverpb.KV";
}

struct RangeSvc(Arc<FakeEtcd>);

impl UnaryService<RangeRequest> for RangeSvc {
    type Response = RangeResponse;
    type Future = BoxFuture<Response<RangeResponse>, Status>;

    fn call(
        &mut self,
        request: Request<RangeRequest>,
    ) -> Self::Future {
        let inner = self.0.clone();
        Box::pin(async move { inner.range(request).await })
    }
}

struct PutSvc(Arc<FakeEtcd>);

impl UnaryService<PutRequest> for PutSvc {
    type Response = PutResponse;
    type Future = BoxFuture<Response<PutResponse>, Status>;

    fn call(
        &mut self,
        request: Request<PutRequest>,
    ) -> Self::Future {
        let inner = self.0.clone();
        Box::pin(async move { inner.put(request).await })
    }
}

impl<B> Service<http::Request<B>> for KvServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(
        &mut self,
        req: http::Request<B>,
    ) -> Self::Future {
        let inner = self.0.clone();
        match req.uri().path() {
            "/etcdserverpb.KV/Range" => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::default());
                Ok(grpc.unary(RangeSvc(inner), req).await)
            }),
            "/etcdserverpb.KV/Put" => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::default());
                Ok(grpc.unary(PutSvc(inner), req).await)
            }),
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}

#[derive(Clone)]
struct WatchServer(Arc<FakeEtcd>);

impl NamedService for WatchServer {
    const NAME: &'static str = "etcdserverpb.Watch";
}

struct WatchSvc(Arc<FakeEtcd>);

impl StreamingService<WatchRequest> for WatchSvc {
    type Response = WatchResponse;
    type ResponseStream = WatchResponseStream;
    type Future = BoxFuture<Response<WatchResponseStream>, Status>;

    fn call(
        &mut self,
        request: Request<Streaming<WatchRequest>>,
    ) -> Self::Future {
        let inner = self.0.clone();
        Box::pin(async move { inner.watch(request).await })
    }
}

impl<B> Service<http::Request<B>> for WatchServer
where
    B: Body + Send + 'static,
    B::Error: Into<StdError> + Send + 'static,
{
    type Response = http::Response<tonic::body::BoxBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<Self::Response, Self::Error>;

    fn poll_ready(
        &mut self,
        _cx: &mut Context<'_>,
    ) -> Poll<std::result::Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(
        &mut self,
        req: http::Request<B>,
    ) -> Self::Future {
        let inner = self.0.clone();
        match req.uri().path() {
            "/etcdserverpb.Watch/Watch" => Box::pin(async move {
                let mut grpc = Grpc::new(ProstCodec::default());
                Ok(grpc.streaming(WatchSvc(inner), req).await)
            }),
            _ => Box::pin(async move { Ok(unimplemented_response()) }),
        }
    }
}
