//! Tests for the manifest format

use kidkv::index::{HashedKey, Locator};
use kidkv::manifest::{Manifest, MANIFEST_FILENAME};
use kidkv::storage::{Address, AddressLayout, FreeSpan, StorageState, Tail};
use kidkv::KidError;
use tempfile::TempDir;

fn sample() -> Manifest {
    Manifest {
        layout: AddressLayout::new(4).unwrap(),
        shard_count: 16,
        storage: StorageState {
            tail: Tail { file: 0, offset: 42 },
            file_count: 1,
            free_spans: vec![FreeSpan {
                address: Address::from_raw(10),
                length: 6,
            }],
        },
        entries: vec![
            (HashedKey::from_raw(1), Locator::new(Address::from_raw(0), 10)),
            (HashedKey::from_raw(99), Locator::new(Address::from_raw(16), 26)),
        ],
    }
}

#[test]
fn test_encode_decode() {
    let manifest = sample();

    let bytes = manifest.encode().unwrap();

    assert_eq!(&bytes[0..4], b"KIDM");
    assert_eq!(Manifest::decode(&bytes).unwrap(), manifest);
}

#[test]
fn test_save_and_load() {
    let dir = TempDir::new().unwrap();
    assert_eq!(Manifest::load(dir.path()).unwrap(), None);

    sample().save(dir.path()).unwrap();

    assert!(dir.path().join(MANIFEST_FILENAME).exists());
    assert!(!dir.path().join(format!("{}.tmp", MANIFEST_FILENAME)).exists());
    assert_eq!(Manifest::load(dir.path()).unwrap(), Some(sample()));
}

#[test]
fn test_bad_magic() {
    let mut bytes = sample().encode().unwrap();
    bytes[0] = b'X';

    assert!(matches!(Manifest::decode(&bytes), Err(KidError::Manifest(_))));
}

#[test]
fn test_unknown_version() {
    let mut bytes = sample().encode().unwrap();
    bytes[4] = 0xFF;

    assert!(matches!(Manifest::decode(&bytes), Err(KidError::Manifest(_))));
}

#[test]
fn test_checksum_mismatch() {
    let mut bytes = sample().encode().unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;

    let err = Manifest::decode(&bytes).unwrap_err();
    assert!(err.to_string().contains("checksum"));
}

#[test]
fn test_truncated_input() {
    let bytes = sample().encode().unwrap();

    assert!(matches!(Manifest::decode(&bytes[..10]), Err(KidError::Manifest(_))));
    assert!(matches!(
        Manifest::decode(&bytes[..bytes.len() - 3]),
        Err(KidError::Manifest(_))
    ));
    assert!(matches!(Manifest::decode(&[]), Err(KidError::Manifest(_))));
}
