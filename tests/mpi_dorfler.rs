//! Run under `mpirun -n <N> cargo test --features mpi-support --test mpi_dorfler`.
#![cfg(feature = "mpi-support")]

use dorfler_mark::adapt::dorfler::compute_threshold_with;
use dorfler_mark::adapt::dorfler::DorflerOptions;
use dorfler_mark::algs::communicator::{Communicator, MpiComm};

#[test]
fn mpi_threshold_covers_fraction() {
    let comm = MpiComm::new().expect("MPI initialization failed");
    let me = comm.rank();
    // Rank r holds (r + 1) · {1, 2, 3}.
    let scale = (me + 1) as f64;
    let local: Vec<f64> = [1.0, 2.0, 3.0].iter().map(|e| e * scale).collect();
    let s = compute_threshold_with(&comm, 0.5, &local, &DorflerOptions::default())
        .expect("marking failed");

    let n = comm.size() as f64;
    let expected_total = 14.0 * (1..=comm.size()).map(|r| (r * r) as f64).sum::<f64>();
    assert_eq!(s.error_total, expected_total);
    assert_eq!(s.elements_total, 3 * n as u64);
    assert!(s.error_marked >= 0.5 * s.error_total);
    assert!(s.threshold > 0.0);
}
