use crate::{
    CoordinateFrame, ErrorKind, GaussianCloud, PackOptions, UnpackOptions, compress,
    decode_from_bytes, encode_to_bytes,
    quant::{COLOR, SCALE, fractional_bits_for, position_step, sh_quantizer},
    scene::sigmoid,
};
use assert_approx_eq::assert_approx_eq;
use glam::Quat;


/// Small deterministic generator so test scenes don't need an rng crate.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> f32 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 40) as f32 / (1u64 << 24) as f32
    }

    fn range(&mut self, min: f32, max: f32) -> f32 {
        min + (max - min) * self.next()
    }
}

pub(crate) fn random_cloud(num_points: usize, sh_degree: u8, seed: u64) -> GaussianCloud {
    let mut rng = Lcg(seed);
    let mut cloud = GaussianCloud::with_points(num_points, sh_degree, seed % 2 == 0);

    for v in &mut cloud.positions {
        *v = rng.range(-50.0, 50.0);
    }
    for v in &mut cloud.scales {
        *v = rng.range(-9.0, 5.0);
    }
    for rotation in cloud.rotations.chunks_exact_mut(4) {
        let q = Quat::from_xyzw(
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
            rng.range(-1.0, 1.0),
        )
        .normalize();
        q.write_to_slice(rotation);
    }
    for v in &mut cloud.alphas {
        *v = rng.range(-5.0, 5.0);
    }
    for v in &mut cloud.colors {
        *v = rng.range(-3.0, 3.0);
    }

    let coeffs = cloud.sh_coeffs_per_point();
    for (i, v) in cloud.sh.iter_mut().enumerate() {
        let (min, max) = sh_quantizer((i / 3) % coeffs).range();
        *v = rng.range(min, max);
    }
    cloud
}

fn assert_rotation_close(got: Quat, want: Quat) {
    let sign = if got.dot(want) < 0.0 { -1.0 } else { 1.0 };
    for (a, b) in got.to_array().into_iter().zip(want.to_array()) {
        assert_approx_eq!(a * sign, b, 3e-3);
    }
}

fn assert_within_quantization(got: &GaussianCloud, want: &GaussianCloud) {
    assert_eq!(got.num_points, want.num_points);
    assert_eq!(got.sh_degree, want.sh_degree);
    assert_eq!(got.antialiased, want.antialiased);
    got.validate().unwrap();

    let position_tolerance = position_step(fractional_bits_for(&want.positions)) * 0.5 + 1e-5;
    for (a, b) in got.positions.iter().zip(&want.positions) {
        assert_approx_eq!(a, b, position_tolerance);
    }
    for (a, b) in got.scales.iter().zip(&want.scales) {
        assert_approx_eq!(a, b, SCALE.step() * 0.5 + 1e-5);
    }
    for (a, b) in got.colors.iter().zip(&want.colors) {
        assert_approx_eq!(a, b, COLOR.step() * 0.5 + 1e-5);
    }
    for (a, b) in got.alphas.iter().zip(&want.alphas) {
        assert_approx_eq!(sigmoid(*a), sigmoid(*b), 0.5 / 255.0 + 1e-5);
    }
    for i in 0..want.num_points {
        assert_rotation_close(got.rotation(i), want.rotation(i));
    }

    let coeffs = want.sh_coeffs_per_point();
    for (i, (a, b)) in got.sh.iter().zip(&want.sh).enumerate() {
        let step = sh_quantizer((i / 3) % coeffs).step();
        assert_approx_eq!(a, b, step * 0.5 + 1e-5);
    }
}

#[test]
fn round_trip_every_degree() {
    for degree in 0..=3 {
        let cloud = random_cloud(200, degree, 7 + u64::from(degree));
        let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
        assert!(compress::is_compressed(&bytes));

        let back = decode_from_bytes(&bytes, &UnpackOptions::default()).unwrap();
        assert_within_quantization(&back, &cloud);
    }
}

#[test]
fn single_point_scene() {
    let mut cloud = GaussianCloud::with_points(1, 0, false);
    cloud.positions = vec![1.0, 2.0, 3.0];
    cloud.alphas = vec![1.0];
    cloud.colors = vec![1.0, 0.0, 0.0];

    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
    let back = decode_from_bytes(&bytes, &UnpackOptions::default()).unwrap();

    assert_eq!(back.num_points, 1);
    let step = position_step(fractional_bits_for(&cloud.positions));
    for (a, b) in back.positions.iter().zip([1.0, 2.0, 3.0]) {
        assert_approx_eq!(a, b, step);
    }
    for (a, b) in back.colors.iter().zip([1.0f32, 0.0, 0.0]) {
        assert!((a - b).abs() <= COLOR.step() * 0.5, "{a} vs {b}");
    }
    assert_eq!(back.colors[1], 0.0);
    assert_eq!(back.colors[2], 0.0);
    assert_approx_eq!(sigmoid(back.alphas[0]), sigmoid(1.0), 0.5 / 255.0 + 1e-6);
    assert_rotation_close(back.rotation(0), Quat::IDENTITY);
    for s in &back.scales {
        assert_approx_eq!(s, 0.0, SCALE.step());
    }
}

#[test]
fn empty_scene_round_trip() {
    for degree in 0..=3 {
        let cloud = GaussianCloud::empty(degree, true);
        let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
        let back = decode_from_bytes(&bytes, &UnpackOptions::default()).unwrap();
        assert_eq!(back, cloud);
    }
}

#[test]
fn same_frame_on_both_sides_matches_unspecified() {
    let cloud = random_cloud(64, 3, 99);
    let plain = decode_from_bytes(
        &encode_to_bytes(&cloud, &PackOptions::default()).unwrap(),
        &UnpackOptions::default(),
    )
    .unwrap();

    for frame in CoordinateFrame::ALL {
        let bytes = encode_to_bytes(&cloud, &PackOptions::new(frame)).unwrap();
        let back = decode_from_bytes(&bytes, &UnpackOptions::new(frame)).unwrap();

        assert_eq!(back.positions, plain.positions, "{frame}");
        assert_eq!(back.scales, plain.scales, "{frame}");
        assert_eq!(back.alphas, plain.alphas, "{frame}");
        assert_eq!(back.colors, plain.colors, "{frame}");
        for (a, b) in back.sh.iter().zip(&plain.sh) {
            assert_approx_eq!(a, b, 1e-6);
        }
        for i in 0..cloud.num_points {
            let (a, b) = (back.rotation(i), plain.rotation(i));
            let sign = if a.dot(b) < 0.0 { -1.0 } else { 1.0 };
            for (x, y) in a.to_array().into_iter().zip(b.to_array()) {
                assert_approx_eq!(x * sign, y, 1e-6);
            }
        }
    }
}

#[test]
fn unpacking_into_another_frame_flips_axes() {
    let cloud = random_cloud(16, 1, 3);
    let bytes = encode_to_bytes(&cloud, &PackOptions::new(CoordinateFrame::Rub)).unwrap();
    let stored = decode_from_bytes(&bytes, &UnpackOptions::default()).unwrap();
    let rdf = decode_from_bytes(&bytes, &UnpackOptions::new(CoordinateFrame::Rdf)).unwrap();

    for (a, b) in rdf.positions.chunks_exact(3).zip(stored.positions.chunks_exact(3)) {
        assert_eq!(a, [b[0], -b[1], -b[2]]);
    }
}

#[test]
fn raw_container_decodes() {
    let cloud = random_cloud(32, 2, 11);
    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
    let raw = compress::decompress(&bytes).unwrap().into_owned();
    assert!(!compress::is_compressed(&raw));

    let from_raw = decode_from_bytes(&raw, &UnpackOptions::default()).unwrap();
    let from_gzip = decode_from_bytes(&bytes, &UnpackOptions::default()).unwrap();
    assert_eq!(from_raw, from_gzip);
}

#[test]
fn every_truncation_is_corrupt() {
    let cloud = random_cloud(5, 1, 5);
    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
    let raw = compress::decompress(&bytes).unwrap().into_owned();

    for len in 0..raw.len() {
        let err = decode_from_bytes(&raw[..len], &UnpackOptions::default()).unwrap_err();
        // Cutting inside the magic leaves too few bytes to recognise a header.
        assert_eq!(err.kind(), ErrorKind::CorruptData, "raw truncated to {len}");
    }

    for len in 0..bytes.len() {
        let err = decode_from_bytes(&bytes[..len], &UnpackOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData, "gzip truncated to {len}");
    }
}

#[test]
fn altered_magic_or_version_is_unsupported() {
    let cloud = random_cloud(4, 0, 1);
    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
    let raw = compress::decompress(&bytes).unwrap().into_owned();

    for offset in [0, 3, 4, 7] {
        let mut bad = raw.clone();
        bad[offset] ^= 0x20;
        let err = decode_from_bytes(&bad, &UnpackOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "offset {offset}");

        let recompressed = compress::compress(&bad).unwrap();
        let err = decode_from_bytes(&recompressed, &UnpackOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedFormat, "offset {offset}");
    }
}

#[test]
fn damaged_gzip_is_corrupt() {
    let cloud = random_cloud(128, 3, 21);
    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();

    for offset in [12, bytes.len() / 2, bytes.len() - 6] {
        let mut bad = bytes.clone();
        bad[offset] ^= 0x5a;
        let err = decode_from_bytes(&bad, &UnpackOptions::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::CorruptData, "offset {offset}");
    }
}

#[test]
fn strict_rejects_trailing_bytes() {
    let cloud = random_cloud(8, 1, 2);
    let bytes = encode_to_bytes(&cloud, &PackOptions::default()).unwrap();
    let mut raw = compress::decompress(&bytes).unwrap().into_owned();
    raw.extend([0, 1, 2]);

    let lenient = decode_from_bytes(&raw, &UnpackOptions::default()).unwrap();
    assert_eq!(lenient.num_points, 8);

    let err = decode_from_bytes(&raw, &UnpackOptions::default().strict()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CorruptData);
}

#[test]
fn invalid_scene_is_rejected() {
    let mut cloud = random_cloud(8, 1, 4);
    cloud.sh.truncate(10);
    let err = encode_to_bytes(&cloud, &PackOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut cloud = random_cloud(8, 1, 4);
    cloud.sh_degree = 4;
    let err = encode_to_bytes(&cloud, &PackOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);

    let mut cloud = random_cloud(8, 1, 4);
    cloud.num_points = usize::MAX / 2;
    let err = encode_to_bytes(&cloud, &PackOptions::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}
