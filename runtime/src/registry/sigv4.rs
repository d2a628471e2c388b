//! AWS Signature Version 4 for the single ECR API call we make.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use shipwatch_core::error::{Result, WatchError};

use crate::http::RequestOptions;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";

/// Static AWS credentials scoped to one region and service.
#[derive(Debug, Clone)]
pub struct AwsCredentials<'a> {
    pub access_key_id: &'a str,
    pub secret_access_key: &'a str,
    pub region: &'a str,
    pub service: &'a str,
}

/// Sign `options` in place, adding `host`, `x-amz-date` and `authorization`.
///
/// Every header already present is signed. The URL must not carry a query.
pub fn sign(options: &mut RequestOptions, credentials: &AwsCredentials<'_>, now: DateTime<Utc>) -> Result<()> {
    let url = url::Url::parse(&options.url)
        .map_err(|e| WatchError::Parse(format!("invalid URL {}: {}", options.url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| WatchError::Parse(format!("URL without host: {}", options.url)))?
        .to_string();
    let path = if url.path().is_empty() { "/" } else { url.path() }.to_string();

    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    options.set_header("host", host);
    options.set_header("x-amz-date", amz_date.clone());

    // BTreeMap keys are lowercase and sorted, as SigV4 requires
    let canonical_headers: String = options
        .headers
        .iter()
        .filter(|(name, _)| name.as_str() != "authorization")
        .map(|(name, value)| format!("{}:{}\n", name, value.trim()))
        .collect();
    let signed_headers = options
        .headers
        .keys()
        .filter(|name| name.as_str() != "authorization")
        .cloned()
        .collect::<Vec<_>>()
        .join(";");
    let payload_hash = hex::encode(Sha256::digest(options.body.as_deref().unwrap_or("").as_bytes()));

    let canonical_request = format!(
        "{}\n{}\n\n{}\n{}\n{}",
        options.method.as_str(),
        path,
        canonical_headers,
        signed_headers,
        payload_hash
    );
    let scope = format!(
        "{}/{}/{}/aws4_request",
        date_stamp, credentials.region, credentials.service
    );
    let string_to_sign = format!(
        "{}\n{}\n{}\n{}",
        ALGORITHM,
        amz_date,
        scope,
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(
        credentials.secret_access_key,
        &date_stamp,
        credentials.region,
        credentials.service,
    )?;
    let signature = hex::encode(hmac_sha256(&key, string_to_sign.as_bytes())?);

    options.set_header(
        "authorization",
        format!(
            "{} Credential={}/{}, SignedHeaders={}, Signature={}",
            ALGORITHM, credentials.access_key_id, scope, signed_headers, signature
        ),
    );
    Ok(())
}

/// `kSigning = HMAC(HMAC(HMAC(HMAC("AWS4" + secret, date), region), service), "aws4_request")`
pub fn signing_key(secret: &str, date_stamp: &str, region: &str, service: &str) -> Result<Vec<u8>> {
    let k_date = hmac_sha256(format!("AWS4{}", secret).as_bytes(), date_stamp.as_bytes())?;
    let k_region = hmac_sha256(&k_date, region.as_bytes())?;
    let k_service = hmac_sha256(&k_region, service.as_bytes())?;
    hmac_sha256(&k_service, b"aws4_request")
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key)
        .map_err(|e| WatchError::Other(format!("HMAC-SHA256 key error: {}", e)))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}
