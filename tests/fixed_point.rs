use cornermatch::fixed::{scale_uchar, Q15_SCALE, WORKING_SCALE};
use cornermatch::lowlevel::{decode_q15, encode_q15};
use cornermatch::{Fixed, Sample};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[test]
fn mixed_scales_follow_the_left_operand() {
    let coarse = Fixed::from_f32(1.25, 4);
    let fine = Fixed::from_f32(0.5, WORKING_SCALE);

    let product = fine * coarse;
    assert_eq!(product.scale(), WORKING_SCALE);
    assert!((product.to_f32() - 0.625).abs() < 1e-4);

    let product = coarse * fine;
    assert_eq!(product.scale(), 4);
    assert!((product.to_f32() - 0.625).abs() < 0.1);
}

#[test]
fn add_sub_and_unit_multiply_are_identities() {
    let mut rng = StdRng::seed_from_u64(0xf1ced);
    for _ in 0..2000 {
        let scale = [0u32, 8, 15, 24][rng.random_range(0..4)];
        let a = Fixed::from_raw(rng.random_range(-(1 << 29)..(1 << 29)), scale);
        let b = Fixed::from_raw(rng.random_range(-(1 << 29)..(1 << 29)), scale);
        assert_eq!((a + b) - b, a, "{a:?} {b:?}");
        assert_eq!(a * Fixed::ONE, a, "{a:?}");
    }
}

#[test]
fn q15_round_trip_of_floats_stays_within_one_unit() {
    let mut rng = StdRng::seed_from_u64(0x15);
    let mut values: Vec<f32> = (0..4000).map(|_| rng.random_range(-1.0f32..1.0)).collect();
    values.extend([-1.0, 0.0, 1.0 - f32::EPSILON, -f32::EPSILON]);

    let fixed: Vec<Fixed> = values
        .iter()
        .map(|&v| Fixed::from_f32(v, WORKING_SCALE))
        .collect();
    let decoded = decode_q15(&encode_q15(&fixed));
    for (&v, back) in values.iter().zip(&decoded) {
        assert!((back.to_f32() - v).abs() <= 1.0 / 32768.0, "{v} -> {back:?}");
    }
}

#[test]
fn overflow_saturates() {
    let big = Fixed::from_int(70_000, WORKING_SCALE);
    assert_eq!(big.raw(), i32::MAX);
    let sum = big + Fixed::ONE;
    assert_eq!(sum.raw(), i32::MAX);
    let neg = -big - Fixed::ONE;
    assert!(neg.raw() <= -i32::MAX);
}

#[test]
fn division_by_zero_returns_dividend() {
    let x = Fixed::from_f32(0.75, WORKING_SCALE);
    assert_eq!((x / Fixed::ZERO).raw(), x.raw());
}

#[test]
fn q15_words_round_trip_values_in_range() {
    let values: Vec<Fixed> = [-1.0f32, -0.5, 0.0, 0.123, 0.999]
        .iter()
        .map(|&v| Fixed::from_f32(v, WORKING_SCALE))
        .collect();
    let decoded = decode_q15(&encode_q15(&values));
    for (a, b) in values.iter().zip(&decoded) {
        assert_eq!(b.scale(), Q15_SCALE);
        assert_eq!(a.raw(), b.raw());
    }
    // out-of-range values clamp to the Q15 limits
    assert_eq!(Fixed::from_f32(3.0, WORKING_SCALE).to_q15(), i16::MAX);
    assert_eq!(Fixed::from_f32(-3.0, WORKING_SCALE).to_q15(), i16::MIN);
}

#[test]
fn pixels_map_identically_on_both_paths() {
    for pixel in [0u8, 1, 64, 128, 200, 255] {
        let fixed = <Fixed as Sample>::from_pixel(pixel);
        assert_eq!(fixed.raw(), scale_uchar(pixel).raw());
        assert_eq!(fixed.to_f32(), <f32 as Sample>::from_pixel(pixel));
    }
}
