//! End-to-end verification protocol tests over the in-memory ledger.

use alloy::primitives::{B256, U256};

use gec_relay::chain::wallet::Wallet;
use gec_relay::session::store::now_unix;
use gec_relay::token::types::{QrToken, SignedToken, TokenRefs, TOKEN_TYPE, VERIFY_SCOPE};
use gec_relay::token::verifier::VerifyError;

mod common;
use common::{TestStack, CONS_ENTITY, MONTH, OTHER_KEY};

/// Sign arbitrary claims the way the issuer does.
async fn sign_claims(wallet: &Wallet, claims: QrToken) -> SignedToken {
    let payload = claims.signing_bytes().unwrap();
    let signature = wallet.sign_message(&payload).await.unwrap();
    SignedToken {
        claims,
        sig: format!("0x{}", hex::encode(signature.as_bytes())),
    }
}

fn claims_template(nonce: &str, exp: u64) -> QrToken {
    QrToken {
        iss: "onboard-vault".to_string(),
        aud: "relay-api".to_string(),
        typ: TOKEN_TYPE.to_string(),
        nonce: nonce.to_string(),
        exp,
        scope: vec![VERIFY_SCOPE.to_string()],
        refs: TokenRefs {
            consumer_id: CONS_ENTITY.to_string(),
            token_id: format!("{:#x}", U256::from(MONTH)),
            month_id: MONTH,
            tx: None,
        },
        redirect: "/verify?qr=".to_string(),
    }
}

#[tokio::test]
async fn full_flow_verifies_anchored_consumption() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10, 5, 7]);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let report = stack.verifier.verify(&issued.encoded).await.unwrap();

    assert!(report.verified);
    assert_eq!(report.entity, CONS_ENTITY);
    assert_eq!(report.units, 22);
    assert_eq!(report.month_id, MONTH);
    assert_eq!(report.tx.as_deref(), Some("0xanchor-tx"));
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let claims = claims_template("0xexpired-nonce", now_unix() - 5);
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Expired));
}

#[tokio::test]
async fn nonce_cannot_be_consumed_twice() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    assert!(stack.verifier.verify(&issued.encoded).await.is_ok());

    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::NonceUsed));
}

#[tokio::test]
async fn concurrent_replays_have_a_single_winner() {
    let stack = std::sync::Arc::new({
        let s = TestStack::new();
        s.register_entities();
        s.settle_and_anchor(&[10]);
        s
    });

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let stack = stack.clone();
        let encoded = issued.encoded.clone();
        tasks.push(tokio::spawn(async move {
            stack.verifier.verify(&encoded).await
        }));
    }

    let mut passes = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            passes += 1;
        }
    }
    assert_eq!(passes, 1);
}

#[tokio::test]
async fn unknown_nonce_is_rejected() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    // Correctly signed and in date, but the nonce was never issued.
    let claims = claims_template("0xnever-issued", now_unix() + 60);
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::NonceUnknown));
}

#[tokio::test]
async fn unanchored_month_fails_verification() {
    let stack = TestStack::new();
    stack.register_entities();
    // Consumption exists and the tree is built, but no root is anchored.
    stack
        .settlements
        .record_consumption(CONS_ENTITY, MONTH, 10)
        .unwrap();
    stack.settlements.build(MONTH).unwrap();

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::NotAnchored(m) if m == MONTH));
}

#[tokio::test]
async fn anchored_root_must_match_local_batch() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    // Overwrite the on-chain root with a foreign commitment.
    stack.ledger.set_root(MONTH, B256::repeat_byte(0xee));

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::RootMismatch));
}

#[tokio::test]
async fn missing_unit_ownership_fails() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);
    // Zero out the consumer's balance on the unit registry.
    stack
        .ledger
        .set_balance(common::consumer_address(), U256::from(MONTH), U256::ZERO);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::OwnershipMissing));
}

#[tokio::test]
async fn token_contents_alone_never_pass() {
    let stack = TestStack::new();
    stack.register_entities();

    // A perfectly formed, signed, in-date token whose refs claim a
    // consumption that the chain has never seen.
    stack
        .settlements
        .record_consumption(CONS_ENTITY, MONTH, 999)
        .unwrap();
    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();

    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::NotAnchored(_)));
}

#[tokio::test]
async fn consumer_without_recorded_consumption_fails() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    // A second registered consumer with units on the ledger but no leaf
    // in the anchored batch.
    let other = "consumer:bystander";
    let other_addr = alloy::primitives::Address::repeat_byte(0xc2);
    stack.entities.add_consumer(other, other_addr).unwrap();
    stack
        .ledger
        .set_balance(other_addr, U256::from(MONTH), U256::from(1u64));

    let issued = stack.issuer.issue(other, MONTH, None).await.unwrap();
    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::NoConsumption { .. }));
}

#[tokio::test]
async fn refs_must_match_the_issued_session() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    // Reuse a live nonce but swap the consumer the refs point at. The
    // signature is valid (issuer key), so the session comparison is the
    // gate that has to catch it.
    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let mut claims = issued.token.claims.clone();
    claims.refs.consumer_id = "consumer:impostor".to_string();
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::RefsMismatch));
}

#[tokio::test]
async fn chain_outage_gives_no_verdict() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);
    stack.ledger.set_unreachable(true);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let err = stack.verifier.verify(&issued.encoded).await.unwrap_err();
    assert!(matches!(err, VerifyError::Chain(_)));
    assert!(!err.is_rejection());
}

#[tokio::test]
async fn wrong_issuer_signature_is_rejected() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let impostor = Wallet::from_private_key(OTHER_KEY, 36900).unwrap();
    let claims = claims_template("0xforged-nonce", now_unix() + 60);
    let token = sign_claims(&impostor, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::BadSignature));
}

#[tokio::test]
async fn tampered_claims_break_the_signature() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let mut token = issued.token.clone();
    // Inflate the claimed month after signing.
    token.claims.refs.month_id += 1;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::BadSignature));
}

#[tokio::test]
async fn wrong_audience_is_rejected() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();

    // Re-sign with a foreign audience so the signature gate passes and
    // the audience gate is what fires.
    let mut claims = issued.token.claims.clone();
    claims.aud = "someone-else".to_string();
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Audience));
}

#[tokio::test]
async fn missing_scope_is_rejected() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    let issued = stack.issuer.issue(CONS_ENTITY, MONTH, None).await.unwrap();
    let mut claims = issued.token.claims.clone();
    claims.scope = vec!["read:profile".to_string()];
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Scope));
}

#[tokio::test]
async fn gate_order_expiry_before_nonce() {
    let stack = TestStack::new();
    stack.register_entities();
    stack.settle_and_anchor(&[10]);

    // Expired AND unknown nonce: the expiry gate must fire first.
    let claims = claims_template("0xboth-bad", now_unix() - 5);
    let token = sign_claims(&stack.issuer_wallet, claims).await;

    let err = stack
        .verifier
        .verify(&token.encode().unwrap())
        .await
        .unwrap_err();
    assert!(matches!(err, VerifyError::Expired));
}

#[tokio::test]
async fn garbage_input_is_malformed() {
    let stack = TestStack::new();
    let err = stack.verifier.verify("@@not-a-token@@").await.unwrap_err();
    assert!(matches!(err, VerifyError::Malformed(_)));
}
