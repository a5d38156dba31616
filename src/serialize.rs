//! Ensemble (de)serialization: a stable binary layout built on `bincode` +
//! `serde`, matching the header/tree-record shape of §6.
//!
//! Grounded on the teacher's `bincode`+`serde` pairing, which the pack
//! carries as a dependency but never wires up a concrete (de)serializer for
//! in the modules this crate draws from — this module is the first real use
//! of that pairing, rather than hand-rolled byte packing, since `serde`
//! derives already cover every type in [`crate::boosting::Ensemble`].

use serde::{Deserialize, Serialize};

use crate::boosting::Ensemble;

const MAGIC: [u8; 4] = *b"DPGB";
const VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    magic: [u8; 4],
    version: u32,
}

/// Errors from (de)serializing an ensemble.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bincode encode/decode failure: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("bad magic bytes: expected {expected:?}, found {found:?}")]
    BadMagic { expected: [u8; 4], found: [u8; 4] },
    #[error("unsupported ensemble format version {found}; this build supports {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Serializes an ensemble into the stable wire layout: a small header
/// (magic + version) followed by the `serde`-derived ensemble body. Field
/// order in [`Ensemble`] already matches §6's
/// `{task, C, F, numeric_mask, η, init_score, T_total, tree records}`
/// shape, so the body is encoded directly rather than re-packed by hand.
pub fn to_bytes(ensemble: &Ensemble) -> Result<Vec<u8>, SerializeError> {
    let mut out = bincode::serialize(&Header {
        magic: MAGIC,
        version: VERSION,
    })?;
    out.extend(bincode::serialize(ensemble)?);
    Ok(out)
}

/// Deserializes an ensemble produced by [`to_bytes`]. Rejects a mismatched
/// magic or an unsupported version before attempting to decode the body, so
/// a corrupt or foreign buffer fails fast with a readable error rather than
/// a confusing downstream panic.
pub fn from_bytes(bytes: &[u8]) -> Result<Ensemble, SerializeError> {
    let header_len = bincode::serialized_size(&Header {
        magic: MAGIC,
        version: VERSION,
    })? as usize;
    if bytes.len() < header_len {
        return Err(bincode::Error::from(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "buffer shorter than ensemble header",
        ))
        .into());
    }
    let header: Header = bincode::deserialize(&bytes[..header_len])?;
    if header.magic != MAGIC {
        return Err(SerializeError::BadMagic {
            expected: MAGIC,
            found: header.magic,
        });
    }
    if header.version != VERSION {
        return Err(SerializeError::UnsupportedVersion {
            found: header.version,
            supported: VERSION,
        });
    }
    let ensemble = bincode::deserialize(&bytes[header_len..])?;
    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DpGbdtConfig;
    use crate::data::Matrix;

    fn toy_ensemble() -> Ensemble {
        let x = Matrix::from_rows(vec![0.0, 1.0, 2.0, 3.0], 4, 1);
        let y = vec![0.0, 0.0, 1.0, 1.0];
        let cfg = DpGbdtConfig::builder()
            .privacy_budget(0.0)
            .nb_trees(3)
            .max_depth(2)
            .seed(1)
            .build(1)
            .unwrap();
        crate::boosting::fit(&x, &y, &cfg, None).unwrap()
    }

    #[test]
    fn round_trips_byte_exact() {
        let ensemble = toy_ensemble();
        let bytes = to_bytes(&ensemble).unwrap();
        let restored = from_bytes(&bytes).unwrap();
        assert_eq!(bytes, to_bytes(&restored).unwrap());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut bytes = to_bytes(&toy_ensemble()).unwrap();
        bytes[0] ^= 0xFF;
        let err = from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, SerializeError::BadMagic { .. }));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let err = from_bytes(&[0u8; 2]).unwrap_err();
        assert!(matches!(err, SerializeError::Bincode(_)));
    }
}
