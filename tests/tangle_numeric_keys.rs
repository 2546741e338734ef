use tangle::{Config, KeyType, Tangle, TangleKey};
use test_log::test;

#[test]
fn tangle_numeric_key_roundtrip() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.set(1234u32, 1).wait()?);
    assert_eq!(1, tangle.get(1234u32).wait()?);

    // Typed key construction order is irrelevant
    assert_eq!(1, tangle.get(TangleKey::from(1234u32)).wait()?);

    Ok(())
}

#[test]
fn tangle_key_types_enumerate_with_tags() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.set("text", 0).wait()?);
    assert!(tangle.set(7u32, 1).wait()?);
    assert!(tangle.set(-7i32, 2).wait()?);
    assert!(tangle.set(7u64, 3).wait()?);
    assert!(tangle.set(-7i64, 4).wait()?);
    assert!(tangle.set(&b"raw"[..], 5).wait()?);

    let mut tags: Vec<KeyType> = tangle
        .keys()
        .wait()?
        .into_iter()
        .map(|key| key.key_type())
        .collect();
    tags.sort_by_key(|&tag| u8::from(tag));

    assert_eq!(
        vec![
            KeyType::Text,
            KeyType::Bytes,
            KeyType::U32,
            KeyType::I32,
            KeyType::U64,
            KeyType::I64,
        ],
        tags,
    );

    Ok(())
}

#[test]
fn tangle_typed_keys_with_same_bytes_alias() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    // Same byte sequence, different declared type
    assert!(tangle.set(TangleKey::from(7u32), 1).wait()?);
    assert!(tangle
        .set(TangleKey::from(7u32.to_le_bytes().to_vec()), 2)
        .wait()?);

    assert_eq!(1, tangle.len());
    assert_eq!(2, tangle.get(7u32).wait()?);

    Ok(())
}
