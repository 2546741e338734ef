use tangle::{Config, Decision, Tangle};
use test_log::test;

#[test]
fn tangle_update_existing_key() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.add("a", 1).wait()?);

    let updated = tangle
        .add_or_update("a", 999, |old| Decision::Replace(old + 1))
        .wait()?;

    assert!(updated);
    assert_eq!(2, tangle.get("a").wait()?);

    Ok(())
}

#[test]
fn tangle_update_absent_key_inserts_default() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    let updated = tangle
        .add_or_update("b", 128, |old| Decision::Replace(old + 1))
        .wait()?;

    assert!(updated);
    assert_eq!(128, tangle.get("b").wait()?);

    Ok(())
}

#[test]
fn tangle_update_keep_leaves_value_and_version() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.add("a", 1).wait()?);
    let version = tangle.version();

    let updated = tangle.add_or_update("a", 999, |_| Decision::Keep).wait()?;

    assert!(!updated);
    assert_eq!(1, tangle.get("a").wait()?);
    assert_eq!(version, tangle.version());

    Ok(())
}
