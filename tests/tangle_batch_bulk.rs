use tangle::{Config, Tangle};
use test_log::test;

const ITEM_COUNT: u64 = 500_000;
const BATCH_SIZE: usize = 256;

#[test]
fn tangle_bulk_batch_insert() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<u64> = Config::new(&folder).open()?;

    let mut batch = tangle.batch();

    for i in (0..ITEM_COUNT).rev() {
        batch.insert(i, i);

        if batch.len() == BATCH_SIZE {
            batch.commit().wait()?;
            batch = tangle.batch();
        }
    }
    if !batch.is_empty() {
        batch.commit().wait()?;
    }

    assert_eq!(ITEM_COUNT, tangle.len());

    let mut values = tangle.values().wait()?;
    values.sort_unstable();

    let expected: Vec<u64> = (0..ITEM_COUNT).collect();
    assert_eq!(expected, values);

    // Spot checks
    assert_eq!(0, tangle.get(0u64).wait()?);
    assert_eq!(123_456, tangle.get(123_456u64).wait()?);
    assert_eq!(ITEM_COUNT - 1, tangle.get(ITEM_COUNT - 1).wait()?);

    Ok(())
}
