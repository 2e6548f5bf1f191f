/*!
Tagged backup artifact codec.

Every named backup is a fixed six-byte header followed by the payload, so
restore logic is a pure function of the header: no gzip magic-byte sniffing,
no probing whether the payload happens to parse as JSON. A payload without the
magic is a raw SQLite image, which is exactly what the `latest.db` alias
always holds.

Layout:

```text
+------+---------+-------+------------------------------+
| TDBA | version | flags | payload                      |
+------+---------+-------+------------------------------+
  4 B      1 B      1 B    gzip([envelope-json | image])
```

Flag bit 0 marks a gzip-compressed payload, bit 1 a metadata envelope. The
envelope is a JSON document carrying the database image hex-encoded next to
its SHA-256, which is verified on decode.
*/

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::compression::{Compression, Gzip};
use crate::{Result, TalentError};

pub const ARTIFACT_MAGIC: [u8; 4] = *b"TDBA";
pub const ARTIFACT_VERSION: u8 = 1;

const HEADER_LEN: usize = 6;
const FLAG_COMPRESSED: u8 = 0b0000_0001;
const FLAG_ENVELOPE: u8 = 0b0000_0010;

/// Which transformations to apply when encoding an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactOptions {
    pub compress: bool,
    pub envelope: bool,
}

/// Context recorded in the metadata envelope at backup time.
#[derive(Debug, Clone)]
pub struct EnvelopeMeta {
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub candidate_count: Option<u64>,
    pub previous_backup_at: Option<DateTime<Utc>>,
}

/// The metadata envelope as stored inside an artifact.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BackupEnvelope {
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub candidate_count: Option<u64>,
    pub previous_backup_at: Option<DateTime<Utc>>,
    /// SHA-256 of the raw database image, hex
    pub sha256: String,
    /// The database image itself, hex
    pub database: String,
}

/// Result of decoding an artifact.
#[derive(Debug)]
pub struct DecodedArtifact {
    /// Raw database image bytes
    pub image: Vec<u8>,
    /// Envelope, when the artifact carried one
    pub envelope: Option<BackupEnvelope>,
    /// False when the input was a bare database image (no header)
    pub tagged: bool,
}

fn compute_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Encode a database image into an artifact.
///
/// `meta` is required when `options.envelope` is set and ignored otherwise.
pub fn encode(
    db_image: &[u8],
    options: ArtifactOptions,
    meta: Option<EnvelopeMeta>,
) -> Result<Vec<u8>> {
    let mut payload = if options.envelope {
        let meta = meta.ok_or_else(|| {
            TalentError::validation("envelope metadata required when envelope flag is set")
        })?;
        let envelope = BackupEnvelope {
            created_at: meta.created_at,
            app_version: meta.app_version,
            candidate_count: meta.candidate_count,
            previous_backup_at: meta.previous_backup_at,
            sha256: compute_sha256(db_image),
            database: hex::encode(db_image),
        };
        serde_json::to_vec(&envelope)?
    } else {
        db_image.to_vec()
    };

    if options.compress {
        payload = Gzip::new().compress(&payload)?;
    }

    let mut flags = 0u8;
    if options.compress {
        flags |= FLAG_COMPRESSED;
    }
    if options.envelope {
        flags |= FLAG_ENVELOPE;
    }

    let mut artifact = Vec::with_capacity(HEADER_LEN + payload.len());
    artifact.extend_from_slice(&ARTIFACT_MAGIC);
    artifact.push(ARTIFACT_VERSION);
    artifact.push(flags);
    artifact.extend_from_slice(&payload);
    Ok(artifact)
}

/// Decode an artifact back to the raw database image.
///
/// Inputs without the artifact magic are returned unchanged as untagged raw
/// images. Envelope hashes are always verified.
pub fn decode(data: &[u8]) -> Result<DecodedArtifact> {
    if data.len() < HEADER_LEN || data[..4] != ARTIFACT_MAGIC {
        return Ok(DecodedArtifact {
            image: data.to_vec(),
            envelope: None,
            tagged: false,
        });
    }

    let version = data[4];
    if version > ARTIFACT_VERSION {
        return Err(TalentError::invalid_format(format!(
            "unsupported artifact version {version} (current: {ARTIFACT_VERSION})"
        )));
    }

    let flags = data[5];
    let mut payload = data[HEADER_LEN..].to_vec();

    if flags & FLAG_COMPRESSED != 0 {
        payload = Gzip::new().decompress(&payload)?;
    }

    if flags & FLAG_ENVELOPE != 0 {
        let envelope: BackupEnvelope = serde_json::from_slice(&payload)?;
        let image = hex::decode(&envelope.database)
            .map_err(|e| TalentError::invalid_format(format!("invalid hex payload: {e}")))?;
        let actual = compute_sha256(&image);
        if actual != envelope.sha256 {
            return Err(TalentError::IntegrityCheckFailed(format!(
                "envelope hash mismatch: expected {}, got {}",
                envelope.sha256, actual
            )));
        }
        Ok(DecodedArtifact {
            image,
            envelope: Some(envelope),
            tagged: true,
        })
    } else {
        Ok(DecodedArtifact {
            image: payload,
            envelope: None,
            tagged: true,
        })
    }
}
