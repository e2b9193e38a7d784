//! Cluster-aware client: routes every call to the shard that owns the key.

use serde::de::DeserializeOwned;
use serde::Serialize;

use kura_core::config::Cluster;
use kura_core::error::{Error, Result};

use crate::routing::ShardMap;
use crate::server::{
    DeleteRequest, DeleteResponse, GetRequest, GetResponse, SetRequest, SetResponse,
};

/// Thin client over the cluster topology. Holds one connection pool; the
/// shard is picked per call from the key hash.
pub struct ClusterClient {
    shard_map: ShardMap,
    http: reqwest::Client,
}

impl ClusterClient {
    pub fn new(cluster: &Cluster) -> Result<Self> {
        Ok(Self {
            shard_map: ShardMap::from_cluster(cluster)?,
            http: reqwest::Client::new(),
        })
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<SetResponse> {
        let shard = self.shard_map.resolve(key.as_bytes());
        self.call(
            &shard.address,
            "set",
            &SetRequest {
                key: key.to_string(),
                value: value.to_string(),
            },
        )
        .await
    }

    pub async fn get(&self, key: &str) -> Result<GetResponse> {
        let shard = self.shard_map.resolve(key.as_bytes());
        self.call(
            &shard.address,
            "get",
            &GetRequest {
                key: key.to_string(),
            },
        )
        .await
    }

    pub async fn delete(&self, key: &str) -> Result<DeleteResponse> {
        let shard = self.shard_map.resolve(key.as_bytes());
        self.call(
            &shard.address,
            "delete",
            &DeleteRequest {
                key: key.to_string(),
            },
        )
        .await
    }

    pub fn shard_map(&self) -> &ShardMap {
        &self.shard_map
    }

    async fn call<Req, Resp>(&self, address: &str, op: &str, request: &Req) -> Result<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("http://{address}/{op}");
        self.http
            .post(&url)
            .json(request)
            .send()
            .await
            .map_err(|e| Error::Rpc {
                detail: format!("{op} to {address}: {e}"),
            })?
            .json()
            .await
            .map_err(|e| Error::Rpc {
                detail: format!("decoding {op} response from {address}: {e}"),
            })
    }
}
