//! Property tests for the host correction stage.
//!
//! Covers: transform round trip, phase-flip sign symmetry, group
//! independence, agreement with a direct DFT reference, zero-CTF and
//! impulse edge cases.

use ndarray::{Array2, Array3, Axis};
use ndarray_rand::RandomExt;
use rand::distributions::Uniform;
use rand::rngs::StdRng;
use rand::SeedableRng;
use proptest::prelude::*;
use recon_ctf::{correct_image, phase_flip, Complex, Corrector, Fft2d, HostCorrector};

fn random_image(ysize: usize, xsize: usize, seed: u64) -> Array2<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    Array2::random_using((ysize, xsize), Uniform::new(-1.0, 1.0), &mut rng)
}

fn random_ctf(num_ctf: usize, ysize: usize, xsize: usize, seed: u64) -> Array3<Complex<f64>> {
    let mut rng = StdRng::seed_from_u64(seed);
    let re = Array3::random_using((num_ctf, ysize, xsize), Uniform::new(-1.0, 1.0), &mut rng);
    let im = Array3::random_using((num_ctf, ysize, xsize), Uniform::new(-1.0, 1.0), &mut rng);
    ndarray::Zip::from(&re)
        .and(&im)
        .map_collect(|&r, &i| Complex::new(r, i))
}

/// forward -> flip -> inverse with a direct O(n^2) DFT.
fn reference_correction(image: &Array2<f64>, ctf: &Array2<Complex<f64>>) -> Array2<f64> {
    let (ysize, xsize) = image.dim();
    let tau = 2.0 * std::f64::consts::PI;
    let dft = |input: &Array2<Complex<f64>>, sign: f64| {
        Array2::from_shape_fn((ysize, xsize), |(v, u)| {
            let mut acc = Complex::new(0.0, 0.0);
            for ((y, x), &val) in input.indexed_iter() {
                let theta = sign
                    * tau
                    * ((u * x) as f64 / xsize as f64 + (v * y) as f64 / ysize as f64);
                acc += val * Complex::new(theta.cos(), theta.sin());
            }
            acc
        })
    };
    let spectrum = dft(&image.mapv(|v| Complex::new(v, 0.0)), -1.0);
    let flipped = ndarray::Zip::from(&spectrum)
        .and(ctf)
        .map_collect(|&s, &c| phase_flip(s, c));
    let n = (xsize * ysize) as f64;
    dft(&flipped, 1.0).mapv(|v| v.re / n)
}

proptest! {
    /// inverse(forward(x)) reproduces x.
    #[test]
    fn fft_round_trip(xsize in 1usize..24, ysize in 1usize..24, seed in any::<u64>()) {
        let image = random_image(ysize, xsize, seed);
        let fft = Fft2d::<f64>::new(xsize, ysize).unwrap();
        let mut buffer: Vec<Complex<f64>> = image.iter().map(|&v| Complex::new(v, 0.0)).collect();
        fft.forward(&mut buffer);
        fft.inverse(&mut buffer);
        for (a, &b) in buffer.iter().zip(image.iter()) {
            prop_assert!((a.re - b).abs() < 1e-12);
            prop_assert!(a.im.abs() < 1e-12);
        }
    }

    /// Negating a CTF negates the flip wherever the original was positive.
    #[test]
    fn phase_flip_negated_ctf(re in 1e-6f64..10.0, im in -10.0f64..10.0, vr in -5.0f64..5.0, vi in -5.0f64..5.0) {
        let v = Complex::new(vr, vi);
        let c = Complex::new(re, im);
        prop_assert_eq!(phase_flip(v, c), v);
        prop_assert_eq!(phase_flip(v, -c), -phase_flip(v, c));
    }

    /// Correcting with -ctf gives the negated image when no CTF real part is zero.
    #[test]
    fn negated_ctf_negates_output(xsize in 1usize..12, ysize in 1usize..12, seed in any::<u64>()) {
        let image = random_image(ysize, xsize, seed);
        let ctf = random_ctf(1, ysize, xsize, seed.wrapping_add(1));
        prop_assume!(ctf.iter().all(|c| c.re != 0.0));
        let corrector = HostCorrector::<f64>::new();
        let pos = correct_image(&corrector, image.view(), ctf.view()).unwrap();
        let neg = correct_image(&corrector, image.view(), ctf.mapv(|c| -c).view()).unwrap();
        for (a, b) in pos.iter().zip(neg.iter()) {
            prop_assert!((a + b).abs() < 1e-10);
        }
    }

    /// Identical transfer functions give identical output images.
    #[test]
    fn identical_ctfs_identical_outputs(
        xsize in 1usize..16,
        ysize in 1usize..16,
        num_ctf in 1usize..6,
        seed in any::<u64>(),
    ) {
        let image = random_image(ysize, xsize, seed);
        let single = random_ctf(1, ysize, xsize, seed.wrapping_add(7));
        let stacked = single
            .broadcast((num_ctf, ysize, xsize))
            .unwrap()
            .to_owned();
        let rec = correct_image(&HostCorrector::<f64>::new(), image.view(), stacked.view()).unwrap();
        let first = rec.index_axis(Axis(0), 0);
        for slot in rec.axis_iter(Axis(0)) {
            prop_assert_eq!(&slot, &first);
        }
    }

    /// A single group matches forward -> flip -> inverse done by direct DFT.
    #[test]
    fn single_group_matches_reference(xsize in 1usize..9, ysize in 1usize..9, seed in any::<u64>()) {
        let image = random_image(ysize, xsize, seed);
        let ctf = random_ctf(1, ysize, xsize, seed.wrapping_add(3));
        let rec = correct_image(&HostCorrector::<f64>::new(), image.view(), ctf.view()).unwrap();
        let expected = reference_correction(&image, &ctf.index_axis(Axis(0), 0).to_owned());
        for (a, b) in rec.index_axis(Axis(0), 0).iter().zip(expected.iter()) {
            prop_assert!((a - b).abs() < 1e-9, "{} vs {}", a, b);
        }
    }
}

#[test]
fn zero_ctf_is_not_a_numeric_fault() {
    let (xsize, ysize) = (9, 7);
    let image: Vec<f32> = (0..xsize * ysize).map(|i| (i as f32 * 0.37).sin()).collect();
    let ctf = vec![Complex::new(0.0f32, 0.0); 2 * xsize * ysize];
    let mut rec = vec![0.0f32; 2 * xsize * ysize];
    HostCorrector::new()
        .correct(&image, &ctf, &mut rec, xsize, ysize, 2)
        .unwrap();
    assert!(rec.iter().all(|v| v.is_finite()));
    for slot in rec.chunks_exact(xsize * ysize) {
        for (a, b) in slot.iter().zip(image.iter()) {
            assert!((a - b).abs() < 1e-5);
        }
    }
}

#[test]
fn impulse_with_all_pass_ctf_is_identity() {
    let (xsize, ysize) = (16, 16);
    let mut image = vec![0.0f32; xsize * ysize];
    image[0] = 1.0;
    let ctf = vec![Complex::new(1.0f32, 0.0); xsize * ysize];
    let mut rec = vec![0.0f32; xsize * ysize];
    HostCorrector::new()
        .correct(&image, &ctf, &mut rec, xsize, ysize, 1)
        .unwrap();
    assert!((rec[0] - 1.0).abs() < 1e-6);
    assert!(rec[1..].iter().all(|v| v.abs() < 1e-6));
}

#[test]
fn f32_and_f64_agree() {
    let (xsize, ysize) = (20, 12);
    let image64 = random_image(ysize, xsize, 42);
    let ctf64 = random_ctf(3, ysize, xsize, 43);
    let image32 = image64.mapv(|v| v as f32);
    let ctf32 = ctf64.mapv(|c| Complex::new(c.re as f32, c.im as f32));

    let rec64 = correct_image(&HostCorrector::<f64>::new(), image64.view(), ctf64.view()).unwrap();
    let rec32 = correct_image(&HostCorrector::<f32>::new(), image32.view(), ctf32.view()).unwrap();
    for (a, b) in rec32.iter().zip(rec64.iter()) {
        assert!((f64::from(*a) - b).abs() < 1e-4);
    }
}
