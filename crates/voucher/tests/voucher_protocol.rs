//! End-to-end: signer issues, reference verifier redeems.

use std::sync::Arc;

use hbird_voucher::{
    Address, ClaimPolicy, ClaimRejection, ClaimVerifier, ConversionRate, OperatorKey,
    OperatorSigner, SignQuery, VoucherError, VoucherSignature, VoucherSigner, U256,
};

const DEV_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
const NOW: u64 = 1_700_000_000;

fn player() -> Address {
    Address::parse(&format!("0x{}", "a".repeat(40))).expect("player")
}

fn contract() -> Address {
    Address::parse(&format!("0x{}", "c".repeat(40))).expect("contract")
}

fn operator() -> Arc<OperatorKey> {
    Arc::new(OperatorKey::from_hex(DEV_KEY).expect("key"))
}

fn query(points: &str, nonce: Option<&str>) -> SignQuery {
    SignQuery {
        player: Some(player().to_hex()),
        points: Some(points.to_string()),
        nonce: nonce.map(str::to_string),
        contract_address: Some(contract().to_hex()),
        ..Default::default()
    }
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 1: Scenario 100 points, nonce 1, default TTL
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn scenario_issue_and_redeem() {
    let key = operator();
    let signer = VoucherSigner::new(key.clone(), ConversionRate::default(), ClaimPolicy::default());
    let verifier = ClaimVerifier::new(key.address(), contract(), ClaimPolicy::default());

    let req = query("100", Some("1")).validate(None).expect("valid");
    let issued = signer.issue(&req, None, NOW).await.expect("issued");

    assert!(issued.self_check_passed());
    assert_eq!(issued.recovered_signer, key.address());
    assert_eq!(issued.voucher.expiry, NOW + 3600);
    assert_eq!(issued.voucher.amount, U256::from(50u64) * U256::exp10(18));

    let receipt = verifier.redeem(&issued.voucher, NOW + 5).expect("redeemed");
    assert_eq!(receipt.amount, issued.voucher.amount);
    assert_eq!(verifier.player_state(&player()).last_nonce, U256::one());
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 2: Past expiry never reaches the signer
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn past_expiry_rejected_before_signing() {
    let signer = VoucherSigner::new(operator(), ConversionRate::default(), ClaimPolicy::default());
    let mut q = query("100", Some("1"));
    q.expiry = Some((NOW - 1).to_string());
    let req = q.validate(None).expect("valid shape");

    let err = signer.issue(&req, None, NOW).await.unwrap_err();
    assert_eq!(err.code(), "Expired");
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 3: Two concurrent vouchers for the same nonce, one redemption
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn concurrent_same_nonce_redeems_once() {
    let key = operator();
    let signer = VoucherSigner::new(key.clone(), ConversionRate::default(), ClaimPolicy::default());
    let verifier = Arc::new(ClaimVerifier::new(key.address(), contract(), ClaimPolicy::default()));

    let req_a = query("100", Some("1")).validate(None).expect("a");
    let req_b = query("80", Some("1")).validate(None).expect("b");
    let (a, b) = tokio::join!(
        signer.issue(&req_a, None, NOW),
        signer.issue(&req_b, None, NOW)
    );
    let a = a.expect("a issued");
    let b = b.expect("b issued");

    let va = {
        let verifier = verifier.clone();
        let voucher = a.voucher.clone();
        tokio::task::spawn_blocking(move || verifier.redeem(&voucher, NOW + 1))
    };
    let vb = {
        let verifier = verifier.clone();
        let voucher = b.voucher.clone();
        tokio::task::spawn_blocking(move || verifier.redeem(&voucher, NOW + 1))
    };
    let results = [va.await.expect("join"), vb.await.expect("join")];

    let accepted = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(accepted, 1);
    let rejected = results.iter().find_map(|r| r.as_ref().err()).expect("one rejected");
    assert_eq!(
        *rejected,
        ClaimRejection::NonceMismatch {
            expected: U256::from(2u64),
            got: U256::one()
        }
    );
    assert_eq!(verifier.claims_processed(), 1);
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 4: Signer wired directly to the verifier's claim state
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn signer_reads_verifier_state() {
    let key = operator();
    let policy = ClaimPolicy::new(3600, 30);
    let signer = VoucherSigner::new(key.clone(), ConversionRate::default(), policy);
    let verifier = ClaimVerifier::new(key.address(), contract(), policy);

    // nonce omitted → filled as 1
    let req = query("10", None).validate(None).expect("valid");
    let first = signer.issue(&req, Some(&verifier), NOW).await.expect("first");
    assert_eq!(first.voucher.nonce, U256::one());
    verifier.redeem(&first.voucher, NOW).expect("redeem first");

    // inside cooldown → short-circuit
    let err = signer.issue(&req, Some(&verifier), NOW + 10).await.unwrap_err();
    assert_eq!(err, VoucherError::CooldownActive { remaining_secs: 20 });

    // stale explicit nonce → mismatch
    let stale = query("10", Some("1")).validate(None).expect("valid");
    let err = signer.issue(&stale, Some(&verifier), NOW + 40).await.unwrap_err();
    assert_eq!(err.code(), "NonceMismatch");

    // after cooldown → nonce 2
    let second = signer.issue(&req, Some(&verifier), NOW + 40).await.expect("second");
    assert_eq!(second.voucher.nonce, U256::from(2u64));
    verifier.redeem(&second.voucher, NOW + 41).expect("redeem second");
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 5: Stale voucher expires between issuance and redemption
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn voucher_expires_before_redemption() {
    let key = operator();
    let signer = VoucherSigner::new(key.clone(), ConversionRate::default(), ClaimPolicy::default());
    let verifier = ClaimVerifier::new(key.address(), contract(), ClaimPolicy::default());

    let req = query("5", Some("1")).validate(None).expect("valid");
    let issued = signer.issue(&req, None, NOW).await.expect("issued");
    let err = verifier.redeem(&issued.voucher, NOW + 3601).unwrap_err();
    assert!(matches!(err, ClaimRejection::ExpiredVoucher { .. }));
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 6: Faulty operator signer is caught by the self-check
// ════════════════════════════════════════════════════════════════════════════

/// Claims one identity but signs with another key.
struct ImpostorSigner {
    claimed: Address,
    actual: OperatorKey,
}

impl OperatorSigner for ImpostorSigner {
    fn address(&self) -> Address {
        self.claimed
    }

    fn sign_digest(&self, digest: &[u8; 32]) -> Result<VoucherSignature, VoucherError> {
        self.actual.sign_digest(digest)
    }
}

#[tokio::test]
async fn integrity_failure_never_returns_voucher() {
    let impostor = ImpostorSigner {
        claimed: operator().address(),
        actual: OperatorKey::from_hex(
            "59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d",
        )
        .expect("key"),
    };
    let signer = VoucherSigner::new(Arc::new(impostor), ConversionRate::default(), ClaimPolicy::default());
    let req = query("100", Some("1")).validate(None).expect("valid");

    let err = signer.issue(&req, None, NOW).await.unwrap_err();
    assert_eq!(err.code(), "SigningIntegrityError");
    assert!(err.is_internal());
}

// ════════════════════════════════════════════════════════════════════════════
// TEST 7: Voucher for another deployment is not redeemable here
// ════════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn cross_contract_voucher_rejected() {
    let key = operator();
    let signer = VoucherSigner::new(key.clone(), ConversionRate::default(), ClaimPolicy::default());
    let other_deployment = ClaimVerifier::new(
        key.address(),
        Address::from_bytes([0xdd; 20]),
        ClaimPolicy::default(),
    );

    let req = query("100", Some("1")).validate(None).expect("valid");
    let issued = signer.issue(&req, None, NOW).await.expect("issued");
    assert_eq!(
        other_deployment.redeem(&issued.voucher, NOW),
        Err(ClaimRejection::InvalidSigner)
    );
}
