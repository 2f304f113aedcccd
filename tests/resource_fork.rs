use dualfork::identity::path::FileSpecifier;
use dualfork::{
    current_check, current_get, ErrorCode, FileError, FileKind, LoadedResource, Location, ResType, ResourceBuilder,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use tempfile::tempdir;

const SND1: ResType = ResType::new(*b"SND1");

#[test]
fn sounds_pack_holds_empty_and_nonempty_entries() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    fs::create_dir(dir.path().join("assets"))?;
    let spec = FileSpecifier::from(dir.path()) + "assets/sounds.pack";

    spec.create(FileKind::ResourceContainer)?;
    assert_eq!(spec.get_type(), Some(FileKind::ResourceContainer));
    assert!(matches!(spec.create(FileKind::ResourceContainer), Err(FileError::AlreadyExists { .. })));

    let mut builder = ResourceBuilder::new();
    builder.add(SND1, 100, vec![0x01, 0x02, 0x03]);
    builder.add(SND1, 200, Vec::new());
    let mut raw = spec.open(true)?;
    builder.write_to(&mut raw)?;
    raw.close()?;

    let mut pack = spec.open_resource_file(false)?;
    assert!(pack.check(SND1, 100));
    assert!(pack.check(SND1, 200));
    assert!(!pack.check(SND1, 300));

    let mut clip = LoadedResource::new();
    pack.get(SND1, 100, &mut clip)?;
    assert_eq!(clip.len()?, 3);
    assert_eq!(clip.as_slice()?, &[0x01, 0x02, 0x03]);

    pack.get(SND1, 200, &mut clip)?;
    assert!(clip.is_loaded());
    assert_eq!(clip.len()?, 0);
    assert_eq!(clip.as_slice()?, &[] as &[u8]);

    let err = pack.get(SND1, 300, &mut clip).unwrap_err();
    assert_eq!(err.code(), ErrorCode::NotPresent);
    // previous contents survive the miss
    assert!(clip.is_loaded());
    assert_eq!(pack.count(SND1), 2);
    Ok(())
}

#[test]
fn random_population_reads_back_exactly() -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let kinds = [*b"snd ", *b"PICT", *b"TEXT", *b"clut", *b"STR#"].map(ResType::new);

    let mut expected: BTreeMap<(ResType, i16), Vec<u8>> = BTreeMap::new();
    while expected.len() < 300 {
        let kind = kinds[rng.gen_range(0..kinds.len())];
        let id: i16 = rng.gen();
        let len = rng.gen_range(0..512);
        let data: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
        expected.insert((kind, id), data);
    }

    let mut builder = ResourceBuilder::new();
    for ((kind, id), data) in &expected {
        builder.add(*kind, *id, data.clone());
    }
    let dir = tempdir()?;
    let spec = FileSpecifier::from(dir.path()) + "population.rsrc";
    let mut raw = spec.open(true)?;
    builder.write_to(&mut raw)?;
    drop(raw);

    let mut forks = spec.open_resource_file(false)?;
    assert_eq!(forks.types().len(), kinds.len());
    let mut out = LoadedResource::new();
    for ((kind, id), data) in &expected {
        assert!(forks.check(*kind, *id));
        forks.get(*kind, *id, &mut out)?;
        assert_eq!(out.as_slice()?, data.as_slice(), "{kind} #{id}");
    }
    for kind in kinds {
        let total = expected.keys().filter(|(k, _)| *k == kind).count();
        assert_eq!(forks.count(kind), total);
    }

    for _ in 0..200 {
        let key = (kinds[rng.gen_range(0..kinds.len())], rng.gen::<i16>());
        assert_eq!(forks.check(key.0, key.1), expected.contains_key(&key));
    }
    Ok(())
}

#[test]
fn nested_contexts_through_real_files() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let text = ResType::new(*b"TEXT");
    let make = |name: &str, id: i16, body: &[u8]| -> Result<FileSpecifier, FileError> {
        let spec = FileSpecifier::from(dir.path()) + name;
        let mut b = ResourceBuilder::new();
        b.add(text, id, body.to_vec());
        let mut raw = spec.open(true)?;
        b.write_to(&mut raw)?;
        Ok(spec)
    };
    let scenario = make("scenario.rsrc", 1, b"scenario")?;
    let shapes = make("shapes.rsrc", 2, b"shapes")?;

    let mut a = scenario.open_resource_file(false)?;
    let mut b = shapes.open_resource_file(false)?;
    assert!(!current_check(text, 1));

    a.push()?;
    b.push()?;
    assert!(current_check(text, 2));
    assert!(!current_check(text, 1));
    b.pop()?;

    let mut out = LoadedResource::new();
    current_get(text, 1, &mut out)?;
    assert_eq!(out.detach()?, b"scenario");
    assert!(!out.is_loaded());

    a.pop()?;
    assert!(a.pop().is_err());
    assert_eq!(a.last_error().code(), Some(ErrorCode::InvalidState));
    Ok(())
}

#[test]
fn writable_open_starts_an_empty_container() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let spec = FileSpecifier::from(dir.path()) + "fresh.rsrc";
    let forks = spec.open_resource_file(true)?;
    assert!(forks.is_open());
    assert!(forks.types().is_empty());

    let plain = FileSpecifier::from(dir.path()) + "plain.txt";
    fs::write(plain.path(), b"definitely not a resource map")?;
    let err = plain.open_resource_file(false).unwrap_err();
    assert_eq!(err.code(), ErrorCode::InvalidFormat);

    let missing = FileSpecifier::from(dir.path()) + "missing.rsrc";
    assert_eq!(missing.open_resource_file(false).unwrap_err().code(), ErrorCode::NotFound);
    Ok(())
}
