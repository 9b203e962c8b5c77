use cornermatch::{
    ErrorKind, Fixed, HarrisConfig, HarrisDetector, Image, LocalBackend, OffloadBackend,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn bright_square() -> Image {
    let mut img = Image::filled(64, 64, 40).unwrap();
    for row in 20..44 {
        for col in 20..44 {
            img.set(row, col, 210);
        }
    }
    img
}

fn random_image(width: usize, height: usize, seed: u64) -> Image {
    let mut rng = StdRng::seed_from_u64(seed);
    let pixels = (0..width * height).map(|_| rng.random::<u8>()).collect();
    Image::new(pixels, width, height).unwrap()
}

fn near(a: (usize, usize), b: (usize, usize), tol: usize) -> bool {
    a.0.abs_diff(b.0) <= tol && a.1.abs_diff(b.1) <= tol
}

#[test]
fn square_corners_are_detected() {
    let img = bright_square();
    let expected = [(20, 20), (20, 43), (43, 20), (43, 43)];

    let mut detector =
        HarrisDetector::new(HarrisConfig::default(), LocalBackend::<f32>::new()).unwrap();
    let corners = detector.detect(img.view());
    assert!(!corners.is_empty());

    for corner in &corners {
        assert!(
            expected.iter().any(|&e| near((corner.row, corner.col), e, 4)),
            "unexpected corner at ({}, {})",
            corner.row,
            corner.col
        );
        assert!(corner.strength >= 0.8);
    }
    for e in expected {
        assert!(corners.iter().any(|c| near((c.row, c.col), e, 4)));
    }
}

fn square_on(size: usize, top: usize, side: usize, background: u8, fill: u8) -> Image {
    let mut img = Image::filled(size, size, background).unwrap();
    for row in top..top + side {
        for col in top..top + side {
            img.set(row, col, fill);
        }
    }
    img
}

#[test]
fn low_contrast_corners_survive_fixed_point() {
    let expected = [(16, 16), (16, 31), (31, 16), (31, 31)];
    for fill in [130u8, 160] {
        let img = square_on(48, 16, 16, 100, fill);
        let mut float =
            HarrisDetector::new(HarrisConfig::default(), LocalBackend::<f32>::new()).unwrap();
        let mut fixed =
            HarrisDetector::new(HarrisConfig::default(), LocalBackend::<Fixed>::new()).unwrap();

        for corners in [float.detect(img.view()), fixed.detect(img.view())] {
            assert_eq!(corners.len(), 4, "fill {fill}: {corners:?}");
            for e in expected {
                assert!(corners.iter().any(|c| near((c.row, c.col), e, 2)));
            }
        }
    }
}

#[test]
fn detection_is_deterministic() {
    let img = random_image(40, 36, 21);
    let mut float =
        HarrisDetector::new(HarrisConfig::default(), LocalBackend::<f32>::new()).unwrap();
    assert_eq!(float.detect(img.view()), float.detect(img.view()));

    let mut fixed =
        HarrisDetector::new(HarrisConfig::default(), LocalBackend::<Fixed>::new()).unwrap();
    let first = fixed.try_detect(img.view()).unwrap();
    let second = fixed.try_detect(img.view()).unwrap();
    assert_eq!(first.corners(), second.corners());
    let raw = |d: &cornermatch::Detection<Fixed>| -> Vec<i32> {
        d.response().data().iter().map(|v| v.raw()).collect()
    };
    assert_eq!(raw(&first), raw(&second));
}

#[test]
fn flat_image_has_no_corners() {
    let img = Image::filled(32, 32, 77).unwrap();
    let mut detector =
        HarrisDetector::new(HarrisConfig::default(), LocalBackend::<Fixed>::new()).unwrap();
    let detection = detector.try_detect(img.view()).unwrap();
    assert!(detection.corners().is_empty());
}

#[test]
fn offload_response_matches_local_fixed() {
    let img = random_image(48, 40, 7);

    let mut local =
        HarrisDetector::new(HarrisConfig::default(), LocalBackend::<Fixed>::new()).unwrap();
    let mut remote =
        HarrisDetector::new(HarrisConfig::default(), OffloadBackend::emulated().unwrap()).unwrap();

    let expected = local.try_detect(img.view()).unwrap();
    let actual = remote.try_detect(img.view()).unwrap();

    let expected_raw: Vec<i32> = expected.response().data().iter().map(|v| v.raw()).collect();
    let actual_raw: Vec<i32> = actual.response().data().iter().map(|v| v.raw()).collect();
    assert_eq!(expected_raw, actual_raw);

    let positions = |d: &cornermatch::Detection<Fixed>| -> Vec<(usize, usize)> {
        d.corners().iter().map(|c| (c.row, c.col)).collect()
    };
    assert_eq!(positions(&expected), positions(&actual));
    assert_eq!(remote.backend().memory().live_buffers(), 0);
}

#[test]
fn exhausted_pool_yields_no_corners() {
    let img = bright_square();
    let backend = OffloadBackend::emulated_with_pool(4096).unwrap();
    let mut detector = HarrisDetector::new(HarrisConfig::default(), backend).unwrap();

    let err = detector.try_detect(img.view()).err().unwrap();
    assert_eq!(err.kind(), ErrorKind::Allocation);
    assert!(detector.detect(img.view()).is_empty());
    assert_eq!(detector.backend().memory().live_buffers(), 0);
}
