use tangle::{Config, Error, Tangle};
use test_log::test;

#[test]
fn tangle_reopen_preserves_contents() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let tangle: Tangle<String> = Config::new(&folder).open()?;

        for i in 0..300u32 {
            assert!(tangle.set(i, i.to_string()).wait()?);
        }

        // Orphan a region so wasted bytes must be recovered, too
        assert!(tangle.set(7u32, "x".repeat(64)).wait()?);
    }

    let tangle: Tangle<String> = Config::new(&folder).open()?;

    assert_eq!(300, tangle.len());
    assert_eq!("123", tangle.get(123u32).wait()?);
    assert_eq!("x".repeat(64), tangle.get(7u32).wait()?);
    assert_eq!(300, tangle.keys().wait()?.len());
    assert!(tangle.wasted_data_bytes() > 0);

    // The reopened tangle accepts writes
    assert!(tangle.set("new", "value".to_string()).wait()?);
    assert_eq!(301, tangle.len());

    Ok(())
}

#[test]
fn tangle_reopen_recovers_wasted_bytes_exactly() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let tangle: Tangle<tangle::Slice> = Config::new(&folder).open()?;

        assert!(tangle.set(1u32, tangle::Slice::from(*b"abcd")).wait()?);
        assert!(tangle.set(1u32, tangle::Slice::from(*b"abcdefgh")).wait()?);
        assert_eq!(4, tangle.wasted_data_bytes());
    }

    let tangle: Tangle<tangle::Slice> = Config::new(&folder).open()?;
    assert_eq!(4, tangle.wasted_data_bytes());

    Ok(())
}

#[test]
fn tangle_refuses_foreign_format_version() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;

    {
        let tangle: Tangle<u32> = Config::new(&folder).open()?;
        assert!(tangle.set(1u32, 1).wait()?);
    }

    // Stamp an unsupported version into the index stream header
    let index_path = folder.path().join("index.tngl");
    let mut bytes = std::fs::read(&index_path)?;
    bytes[..4].copy_from_slice(&2u32.to_le_bytes());
    std::fs::write(&index_path, bytes)?;

    assert!(matches!(
        Config::new(&folder).open::<u32>(),
        Err(Error::InvalidVersion(2)),
    ));

    Ok(())
}
