use tangle::{Config, Error, Slice, Tangle};
use test_log::test;

#[test]
fn tangle_find_reads_until_modified() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.set("a", 1).wait()?);

    let found = tangle.find("a").wait()?;
    assert_eq!(&tangle::TangleKey::from("a"), found.key());

    // Reads agree with get() while nothing changes
    assert_eq!(1, found.value().wait()?);
    assert_eq!(tangle.get("a").wait()?, found.value().wait()?);

    // Any mutation stales the result
    assert!(tangle.set("b", 2).wait()?);
    assert!(matches!(found.value().wait(), Err(Error::Modified)));

    Ok(())
}

#[test]
fn tangle_find_missing_key() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(matches!(
        tangle.find("missing").wait(),
        Err(Error::KeyNotFound(_)),
    ));

    Ok(())
}

#[test]
fn tangle_find_set_value_in_place() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.set("a", 1).wait()?);

    let found = tangle.find("a").wait()?;
    found.set_value(5).wait()?;

    assert_eq!(5, tangle.get("a").wait()?);

    // The write itself bumped the version, staling the result
    assert!(matches!(found.value().wait(), Err(Error::Modified)));

    Ok(())
}

#[test]
fn tangle_find_raw_value_access() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<Slice> = Config::new(&folder).open()?;

    assert!(tangle.set("a", Slice::from(*b"abcd")).wait()?);

    let found = tangle.find("a").wait()?;
    assert_eq!(Slice::from(*b"abcd"), found.raw_value().wait()?);

    let found = tangle.find("a").wait()?;
    found.set_raw_value(*b"dcba").wait()?;
    assert_eq!(Slice::from(*b"dcba"), tangle.get("a").wait()?);

    Ok(())
}

#[test]
fn tangle_find_after_dispose() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.set("a", 1).wait()?);
    let found = tangle.find("a").wait()?;

    drop(tangle);

    assert!(matches!(found.value().wait(), Err(Error::Disposed)));

    Ok(())
}
