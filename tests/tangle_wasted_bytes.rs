use tangle::{Config, Slice, Tangle};
use test_log::test;

#[test]
fn tangle_wasted_bytes_accounting() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<Slice> = Config::new(&folder).open()?;

    assert_eq!(0, tangle.wasted_data_bytes());

    // Fresh insert wastes nothing
    assert!(tangle.set(1u32, Slice::from(*b"abcd")).wait()?);
    assert_eq!(0, tangle.wasted_data_bytes());

    // Growing orphans the old 4-byte region
    assert!(tangle.set(1u32, Slice::from(*b"abcdefgh")).wait()?);
    assert_eq!(4, tangle.wasted_data_bytes());

    // Shrinking reuses the region in place
    assert!(tangle.set(1u32, Slice::from(*b"abc")).wait()?);
    assert_eq!(4, tangle.wasted_data_bytes());

    // Growing back into the retained region wastes nothing either
    assert!(tangle.set(1u32, Slice::from(*b"abcdefgh")).wait()?);
    assert_eq!(4, tangle.wasted_data_bytes());

    assert_eq!(Slice::from(*b"abcdefgh"), tangle.get(1u32).wait()?);

    Ok(())
}

#[test]
fn tangle_shrunk_value_zero_pads_region() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<Slice> = Config::new(&folder).open()?;

    assert!(tangle.set(1u32, Slice::from(*b"abcdefgh")).wait()?);
    assert!(tangle.set(1u32, Slice::from(*b"abc")).wait()?);

    // The raw codec is greedy: it sees the whole region, tail zeroed
    assert_eq!(
        Slice::from(*b"abc\0\0\0\0\0"),
        tangle.get(1u32).wait()?
    );

    Ok(())
}

#[test]
fn tangle_empty_value_is_representable() -> tangle::Result<()> {
    let folder = tempfile::tempdir()?;
    let tangle: Tangle<Slice> = Config::new(&folder).open()?;

    assert!(tangle.set("empty", Slice::empty()).wait()?);

    assert_eq!(1, tangle.len());
    assert_eq!(Slice::empty(), tangle.get("empty").wait()?);
    assert_eq!(0, tangle.wasted_data_bytes());

    Ok(())
}
