use tangle::{Config, Tangle};
use test_log::test;

const ITEM_COUNT: u64 = 1_000;

#[test]
fn tangle_count_reflects_unique_keys() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u64> = Config::new(&folder).open()?;

    assert!(tangle.is_empty());

    for i in 0..ITEM_COUNT {
        assert!(tangle.set(i, i).wait()?);
    }
    assert_eq!(ITEM_COUNT, tangle.len());

    // Overwrites do not change the count
    for i in 0..ITEM_COUNT {
        assert!(tangle.set(i, i + 1).wait()?);
    }
    assert_eq!(ITEM_COUNT, tangle.len());

    Ok(())
}

#[test]
fn tangle_add_does_not_overwrite() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert!(tangle.add(1u32, 1).wait()?);
    assert!(!tangle.add(1u32, 2).wait()?);

    assert_eq!(1, tangle.get(1u32).wait()?);
    assert_eq!(1, tangle.len());

    Ok(())
}

#[test]
fn tangle_version_moves_on_every_mutation() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    assert_eq!(0, tangle.version());

    assert!(tangle.set(1u32, 1).wait()?);
    assert_eq!(1, tangle.version());

    assert!(tangle.set(1u32, 2).wait()?);
    assert_eq!(2, tangle.version());

    // A refused add is not a mutation
    assert!(!tangle.add(1u32, 3).wait()?);
    assert_eq!(2, tangle.version());

    // Neither is a read
    assert_eq!(2, tangle.get(1u32).wait()?);
    assert_eq!(2, tangle.version());

    Ok(())
}

#[test]
fn tangle_node_count_grows_with_splits() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u64> = Config::new(&folder).open()?;

    assert_eq!(1, tangle.node_count());

    for i in 0..ITEM_COUNT {
        assert!(tangle.set(i, i).wait()?);
    }

    assert!(tangle.node_count() > 1);

    Ok(())
}
