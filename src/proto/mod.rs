//! Wire types and gRPC stubs for the subset of the etcd v3 API the watcher
//! speaks: `KV.Range`, `KV.Put` and `Watch.Watch`.
//!
//! The messages are declared with `prost` derives using etcd's field tags, and
//! the client stubs drive `tonic::client::Grpc` directly, so no protobuf
//! toolchain is needed at build time. Fields the watcher never reads or sets
//! are left out; prost skips unknown tags on decode.

pub mod etcdserverpb;
pub mod mvccpb;
