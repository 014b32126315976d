use std::io::Read;
use std::time::Duration;

use rusty_s3::{Bucket, Credentials, S3Action, UrlStyle};

use crate::retry::RequestFailure;
use crate::{Result, StorageBackend, StorageError, StoreConfig};

/// Duration for presigned URL validity.
const PRESIGN_DURATION: Duration = Duration::from_secs(3600);

/// S3-compatible backend using presigned requests over a blocking agent.
#[derive(Debug)]
pub struct S3Backend {
    bucket: Bucket,
    credentials: Credentials,
    agent: ureq::Agent,
    retry: crate::RetryConfig,
    /// Prefix (root path) prepended to all keys.
    root: String,
}

impl S3Backend {
    pub fn new(cfg: &StoreConfig) -> Result<Self> {
        let base_url: url::Url = cfg.endpoint.parse().map_err(|e| {
            StorageError::Config(format!("invalid S3 endpoint URL '{}': {e}", cfg.endpoint))
        })?;

        if base_url.scheme() == "http" {
            if !cfg.allow_insecure_http {
                return Err(StorageError::Config(format!(
                    "endpoint '{}' is plain HTTP; pass --allow-insecure-http to accept \
                     sending credentials and data unencrypted",
                    cfg.endpoint
                )));
            }
            tracing::warn!(endpoint = %cfg.endpoint, "using unencrypted HTTP transport");
        }

        // Endpoint is always explicit; use path-style addressing so buckets
        // on MinIO-style stores resolve without DNS games.
        let bucket = Bucket::new(
            base_url,
            UrlStyle::Path,
            cfg.bucket.clone(),
            cfg.region.clone(),
        )
        .map_err(|e| StorageError::Config(format!("failed to create S3 bucket handle: {e}")))?;

        let credentials = Credentials::new(&cfg.access_key_id, &cfg.secret_access_key);

        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .timeout_read(Duration::from_secs(300))
            .timeout_write(Duration::from_secs(300))
            .build();

        let root = cfg.root.trim_matches('/').to_string();

        Ok(Self {
            bucket,
            credentials,
            agent,
            retry: cfg.retry.clone(),
            root,
        })
    }

    /// Prepend the root prefix to a key.
    fn full_key(&self, key: &str) -> String {
        if self.root.is_empty() {
            key.to_string()
        } else {
            format!("{}/{}", self.root, key)
        }
    }

    #[allow(clippy::result_large_err)]
    fn retry_call<T>(
        &self,
        op_name: &str,
        f: impl Fn() -> std::result::Result<T, ureq::Error>,
    ) -> std::result::Result<T, ureq::Error> {
        crate::retry::with_backoff(&self.retry, op_name, crate::retry::transient_http, f)
    }

    fn retry_call_body<T>(
        &self,
        op_name: &str,
        f: impl Fn() -> std::result::Result<T, RequestFailure>,
    ) -> std::result::Result<T, RequestFailure> {
        crate::retry::with_backoff(&self.retry, op_name, RequestFailure::is_transient, f)
    }
}

impl StorageBackend for S3Backend {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let full_key = self.full_key(key);
        let url = self
            .bucket
            .get_object(Some(&self.credentials), &full_key)
            .sign(PRESIGN_DURATION);

        self.retry_call_body(&format!("GET {key}"), || {
            match self.agent.get(url.as_str()).call() {
                Ok(resp) => {
                    let mut buf = Vec::new();
                    resp.into_reader()
                        .read_to_end(&mut buf)
                        .map_err(RequestFailure::Body)?;
                    Ok(Some(buf))
                }
                Err(ureq::Error::Status(404, _)) => Ok(None),
                Err(e) => Err(RequestFailure::http(e)),
            }
        })
        .map_err(|e| StorageError::transfer("S3", format!("GET {key}"), e))
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<()> {
        let full_key = self.full_key(key);
        let url = self
            .bucket
            .put_object(Some(&self.credentials), &full_key)
            .sign(PRESIGN_DURATION);

        self.retry_call(&format!("PUT {key}"), || {
            self.agent.put(url.as_str()).send_bytes(data)
        })
        .map_err(|e| StorageError::transfer("S3", format!("PUT {key}"), e))?;
        Ok(())
    }

    fn exists(&self, key: &str) -> Result<bool> {
        let full_key = self.full_key(key);
        let url = self
            .bucket
            .head_object(Some(&self.credentials), &full_key)
            .sign(PRESIGN_DURATION);

        match self.retry_call(&format!("HEAD {key}"), || {
            self.agent.head(url.as_str()).call()
        }) {
            Ok(_) => Ok(true),
            Err(ureq::Error::Status(404, _)) => Ok(false),
            Err(e) => Err(StorageError::transfer("S3", format!("HEAD {key}"), e)),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let full_key = self.full_key(key);
        let url = self
            .bucket
            .delete_object(Some(&self.credentials), &full_key)
            .sign(PRESIGN_DURATION);

        match self.retry_call(&format!("DELETE {key}"), || {
            self.agent.delete(url.as_str()).call()
        }) {
            Ok(_) => Ok(()),
            // Deleting an object that is already gone is a success.
            Err(ureq::Error::Status(404, _)) => Ok(()),
            Err(e) => Err(StorageError::transfer("S3", format!("DELETE {key}"), e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RetryConfig;

    fn config(endpoint: &str, allow_insecure_http: bool) -> StoreConfig {
        StoreConfig {
            bucket: "bundles".to_string(),
            region: "us-east-1".to_string(),
            endpoint: endpoint.to_string(),
            access_key_id: "key".to_string(),
            secret_access_key: "secret".to_string(),
            root: String::new(),
            allow_insecure_http,
            retry: RetryConfig::default(),
        }
    }

    #[test]
    fn https_endpoint_is_accepted() {
        assert!(S3Backend::new(&config("https://s3.example.com", false)).is_ok());
    }

    #[test]
    fn plain_http_endpoint_requires_opt_in() {
        let err = S3Backend::new(&config("http://127.0.0.1:9000", false)).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
        assert!(S3Backend::new(&config("http://127.0.0.1:9000", true)).is_ok());
    }

    #[test]
    fn garbage_endpoint_is_a_config_error() {
        let err = S3Backend::new(&config("not a url", false)).unwrap_err();
        assert!(matches!(err, StorageError::Config(_)));
    }
}
