use tangle::{BarrierCollection, Config, Tangle};
use test_log::test;

#[test]
fn tangle_closed_barrier_holds_back_writes() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    let (barrier, reached) = tangle.barrier(false);
    let add = tangle.add(1u32, 1);

    // The worker reaches the barrier, but may not run the add yet
    reached.wait()?;
    assert_eq!(0, tangle.len());

    barrier.open();
    assert!(add.wait()?);
    assert_eq!(1, tangle.len());

    Ok(())
}

#[test]
fn tangle_open_barrier_does_not_pause() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    let (_, reached) = tangle.barrier(true);
    let add = tangle.add(1u32, 1);

    reached.wait()?;
    assert!(add.wait()?);
    assert_eq!(1, tangle.len());

    Ok(())
}

#[test]
fn tangle_barrier_collection_opens_together() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u32> = Config::new(&folder).open()?;

    let mut collection = BarrierCollection::new();
    collection.push(tangle.barrier(false));
    collection.push(tangle.barrier(false));
    assert_eq!(2, collection.len());

    let add = tangle.add(1u32, 1);

    collection.open_all();
    collection.wait_reached()?;

    assert!(add.wait()?);
    assert_eq!(1, tangle.len());

    Ok(())
}
