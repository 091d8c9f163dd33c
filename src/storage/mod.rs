// clickvault/src/storage/mod.rs
#[cfg(test)]
pub(crate) mod fake;

use std::path::Path;

use anyhow::{Context, Result};
use aws_sdk_s3 as s3;
use s3::config::Region;
use s3::primitives::ByteStream;
use tokio::io::AsyncWriteExt;

use crate::config::S3Config;

/// Operations the engines need from the remote backup tier. Names handed to
/// these methods are artifact names; any storage-side prefixing is the
/// implementation's concern.
///
/// All operations are single attempts; retry policy, if any, belongs to the
/// caller.
pub trait BlobStore: Send + Sync {
    async fn put(&self, file_path: &Path, name: &str) -> Result<()>;
    async fn get(&self, name: &str, destination: &Path) -> Result<()>;
    async fn list(&self) -> Result<Vec<String>>;
    async fn delete(&self, name: &str) -> Result<()>;
    async fn exists(&self, name: &str) -> Result<bool>;
}

/// S3-compatible object store holding the remote backup tier. The configured
/// folder prefix is applied to every key internally.
pub struct S3Store {
    client: s3::Client,
    bucket: String,
    prefix: Option<String>,
}

impl S3Store {
    pub async fn connect(config: &S3Config) -> Result<Self> {
        let sdk_config = aws_config::defaults(s3::config::BehaviorVersion::latest())
            .endpoint_url(&config.endpoint_url)
            .region(Region::new(config.region.clone()))
            .credentials_provider(s3::config::Credentials::new(
                &config.access_key_id,
                &config.secret_access_key,
                None, // session_token
                None, // expiry
                "Static",
            ))
            .load()
            .await;

        Ok(S3Store {
            client: s3::Client::new(&sdk_config),
            bucket: config.bucket_name.clone(),
            prefix: config.folder_prefix.clone(),
        })
    }

    fn full_key(&self, name: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}/{}", prefix.trim_end_matches('/'), name),
            None => name.to_string(),
        }
    }
}

impl BlobStore for S3Store {
    async fn put(&self, file_path: &Path, name: &str) -> Result<()> {
        let key = self.full_key(name);
        let body = ByteStream::from_path(file_path).await.with_context(|| {
            format!("Failed to read file for upload: {}", file_path.display())
        })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(body)
            .send()
            .await
            .with_context(|| {
                format!(
                    "Failed to upload {} to bucket {} with key {}",
                    file_path.display(),
                    self.bucket,
                    key
                )
            })?;
        Ok(())
    }

    async fn get(&self, name: &str, destination: &Path) -> Result<()> {
        let key = self.full_key(name);
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!(
                    "Failed to create directory for download: {}",
                    parent.display()
                )
            })?;
        }

        let mut object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to get object s3://{}/{}", self.bucket, key))?;

        let mut output_file = tokio::fs::File::create(destination).await.with_context(|| {
            format!(
                "Failed to create destination file: {}",
                destination.display()
            )
        })?;

        while let Some(bytes_chunk) = object
            .body
            .try_next()
            .await
            .with_context(|| format!("Failed reading body of s3://{}/{}", self.bucket, key))?
        {
            output_file.write_all(&bytes_chunk).await.with_context(|| {
                format!("Failed to write to {}", destination.display())
            })?;
        }
        output_file.flush().await?;
        Ok(())
    }

    /// Lists artifact names under the configured prefix (prefix stripped).
    async fn list(&self) -> Result<Vec<String>> {
        let list_prefix = self.prefix.as_ref().map(|p| format!("{}/", p.trim_end_matches('/')));
        let mut names = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket);
            if let Some(prefix) = &list_prefix {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }
            let response = request.send().await.with_context(|| {
                format!("Failed to list objects in bucket {}", self.bucket)
            })?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    let name = match &list_prefix {
                        Some(prefix) => key.strip_prefix(prefix.as_str()).unwrap_or(key),
                        None => key,
                    };
                    if !name.is_empty() {
                        names.push(name.to_string());
                    }
                }
            }

            match response.next_continuation_token() {
                Some(token) => continuation = Some(token.to_string()),
                None => break,
            }
        }
        Ok(names)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        let key = self.full_key(name);
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
            .with_context(|| format!("Failed to delete s3://{}/{}", self.bucket, key))?;
        Ok(())
    }

    async fn exists(&self, name: &str) -> Result<bool> {
        let key = self.full_key(name);
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(&key)
            .send()
            .await
        {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(
                        "Failed HEAD on s3://{}/{}: {}",
                        self.bucket,
                        key,
                        service_error
                    ))
                }
            }
        }
    }
}

/// Parses an `s3://bucket/key` URI into bucket and key.
pub fn parse_s3_uri(s3_uri: &str) -> Result<(String, String)> {
    let uri =
        url::Url::parse(s3_uri).with_context(|| format!("Invalid S3 URI format: {}", s3_uri))?;
    if uri.scheme() != "s3" {
        return Err(anyhow::anyhow!("S3 URI must start with s3://"));
    }
    let bucket = uri
        .host_str()
        .context("S3 URI missing bucket name")?
        .to_string();
    let key = uri.path().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(anyhow::anyhow!("S3 URI missing key (object path)"));
    }
    Ok((bucket, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_s3_uri() {
        let (bucket, key) = parse_s3_uri("s3://backups/clickvault/prod_backup_20250101_000000.tar.gz").unwrap();
        assert_eq!(bucket, "backups");
        assert_eq!(key, "clickvault/prod_backup_20250101_000000.tar.gz");
    }

    #[test]
    fn test_parse_s3_uri_rejects_other_schemes() {
        assert!(parse_s3_uri("https://backups/key").is_err());
        assert!(parse_s3_uri("s3://bucket-only").is_err());
    }
}
