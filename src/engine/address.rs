/// Address records
use super::{ResolveEngine, WriteOutcome};
use crate::{
    auth::{address_message, hash_serial_message, key_status_message, require_signature},
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
    hash::{is_empty_org_hash, is_hex_digest, Hash},
    invite::verify_invite_token,
    metrics,
    pow::{ProofOfWork, ProofOfWorkGate},
    repository::{KeyStatus, NewRecord, RecordUpdate, ResolveRecord},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Create/update body
#[derive(Debug, Clone, Deserialize)]
pub struct AddressUpload {
    pub user_hash: String,
    #[serde(default)]
    pub org_hash: String,
    #[serde(default)]
    pub org_token: Option<String>,
    pub public_key: PublicKey,
    #[serde(default)]
    pub routing_id: String,
    #[serde(default)]
    pub redirect_hash: Option<String>,
    #[serde(default)]
    pub proof: Option<ProofOfWork>,
}

/// Optional body of a hard delete. With an organisation hash the delete is
/// authorised by the organisation key instead of the address key.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AddressDeleteRequest {
    #[serde(default)]
    pub user_hash: String,
    #[serde(default)]
    pub org_hash: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AddressInfo {
    pub hash: String,
    pub routing_id: String,
    pub public_key: PublicKey,
    pub proof: String,
    pub serial_number: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub redirect_hash: String,
}

impl From<ResolveRecord> for AddressInfo {
    fn from(record: ResolveRecord) -> Self {
        Self {
            hash: record.hash,
            routing_id: record.routing_id,
            public_key: record.public_key,
            proof: record.proof,
            serial_number: record.serial,
            redirect_hash: record.redir_hash,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct KeyStatusInfo {
    pub hash: String,
    pub fingerprint: String,
    pub status: KeyStatus,
}

impl ResolveEngine {
    /// The record `hash` resolves to after following redirections
    pub async fn get_address(&self, hash: &Hash) -> ResolverResult<AddressInfo> {
        let record = self.redirects().resolve(hash.as_str()).await?;
        Ok(record.into())
    }

    /// Create the address, or update it when a live record exists
    pub async fn upsert_address(
        &self,
        hash: &Hash,
        upload: AddressUpload,
        auth: Option<&str>,
    ) -> ResolverResult<WriteOutcome> {
        let user_hash = upload.user_hash.to_ascii_lowercase();
        let org_hash = upload.org_hash.to_ascii_lowercase();

        if !hash.verify(&user_hash, &org_hash) {
            return Err(ResolverError::validation("hash verification failed"));
        }

        let is_org_address = !is_empty_org_hash(&org_hash);
        if upload.org_token.is_some() && !is_org_address {
            return Err(ResolverError::validation("invalid data"));
        }

        let redirect = match upload.redirect_hash.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(target) => Some(
                Hash::parse(target).map_err(|_| ResolverError::validation("invalid redirect target"))?,
            ),
        };

        let routing_id = upload.routing_id.trim().to_ascii_lowercase();
        let routing_ok = is_hex_digest(&routing_id) || (routing_id.is_empty() && redirect.is_some());
        if !routing_ok {
            return Err(ResolverError::validation("invalid routing id"));
        }

        // A token is only accepted when it checks out against the organisation key
        let invited = match upload.org_token.as_deref() {
            Some(token) => {
                let organisation = self
                    .repos
                    .organisations
                    .get(&org_hash)
                    .await
                    .map_err(|e| if e.is_internal() { e } else { ResolverError::Authentication })?;

                if !verify_invite_token(token, hash.as_str(), &routing_id, &organisation.public_key, self.clock.now()) {
                    debug!("invite token rejected for {}", hash);
                    return Err(ResolverError::Authentication);
                }
                true
            }
            None => false,
        };

        let current = match self.repos.addresses.get(hash.as_str()).await {
            Ok(record) => Some(record),
            Err(ResolverError::NotFound) => None,
            Err(e) => return Err(e),
        };

        match current {
            None => {
                if is_org_address && !invited {
                    return Err(ResolverError::validation("need org token when creating"));
                }
                if is_org_address && redirect.is_none() {
                    return Err(ResolverError::validation(
                        "organisation address requires a redirect hash",
                    ));
                }
                if !invited {
                    ProofOfWorkGate::new(self.policy.pow_bits_address)
                        .check(upload.proof.as_ref(), hash.as_str())?;
                }
                if let Some(target) = &redirect {
                    self.redirects().check_target(hash.as_str(), target.as_str()).await?;
                }

                self.repos
                    .addresses
                    .create(NewRecord {
                        hash: hash.to_string(),
                        routing_id,
                        redir_hash: redirect.map(|h| h.to_string()).unwrap_or_default(),
                        public_key: upload.public_key,
                        proof: upload.proof.map(|p| p.to_string()).unwrap_or_default(),
                        validations: Vec::new(),
                    })
                    .await?;

                info!("address {} created", hash);
                metrics::record_write("address", "create");
                Ok(WriteOutcome::Created)
            }
            Some(current) => {
                require_signature(
                    auth,
                    &current.public_key,
                    &address_message(&current.hash, &current.routing_id, current.serial),
                )?;
                if let Some(target) = &redirect {
                    self.redirects().check_target(hash.as_str(), target.as_str()).await?;
                }

                self.repos
                    .addresses
                    .update(
                        &current,
                        RecordUpdate {
                            routing_id,
                            redir_hash: redirect.map(|h| h.to_string()).unwrap_or_default(),
                            public_key: upload.public_key,
                            validations: Vec::new(),
                        },
                    )
                    .await?;

                info!("address {} updated", hash);
                metrics::record_write("address", "update");
                Ok(WriteOutcome::Updated)
            }
        }
    }

    /// Remove the address for good, authorised by its own key or, when the
    /// request names the parent organisation, by the organisation key
    pub async fn delete_address(
        &self,
        hash: &Hash,
        request: Option<AddressDeleteRequest>,
        auth: Option<&str>,
    ) -> ResolverResult<()> {
        let current = self
            .repos
            .addresses
            .get_raw(hash.as_str())
            .await?
            .ok_or(ResolverError::NotFound)?;

        match request.filter(|r| !is_empty_org_hash(&r.org_hash)) {
            Some(request) => {
                let user_hash = request.user_hash.to_ascii_lowercase();
                let org_hash = request.org_hash.to_ascii_lowercase();
                if !hash.verify(&user_hash, &org_hash) {
                    debug!("address {} does not belong to organisation {}", hash, org_hash);
                    return Err(ResolverError::Authentication);
                }

                let organisation = self
                    .repos
                    .organisations
                    .get(&org_hash)
                    .await
                    .map_err(|e| if e.is_internal() { e } else { ResolverError::Authentication })?;

                require_signature(
                    auth,
                    &organisation.public_key,
                    &hash_serial_message(&current.hash, current.serial),
                )?;
            }
            None => {
                require_signature(
                    auth,
                    &current.public_key,
                    &address_message(&current.hash, &current.routing_id, current.serial),
                )?;
            }
        }

        self.repos.addresses.delete(hash.as_str()).await?;

        info!("address {} deleted", hash);
        metrics::record_write("address", "delete");
        Ok(())
    }

    /// Hide the address from reads. Returns the new serial.
    pub async fn soft_delete_address(&self, hash: &Hash, auth: Option<&str>) -> ResolverResult<u64> {
        let current = self
            .repos
            .addresses
            .get_raw(hash.as_str())
            .await?
            .filter(|r| !r.deleted)
            .ok_or(ResolverError::NotFound)?;

        require_signature(
            auth,
            &current.public_key,
            &address_message(&current.hash, &current.routing_id, current.serial),
        )?;

        let serial = self.repos.addresses.soft_delete(hash.as_str()).await?;

        info!("address {} soft-deleted", hash);
        metrics::record_write("address", "soft_delete");
        Ok(serial)
    }

    /// Make a soft-deleted address visible again. Returns the new serial.
    pub async fn undelete_address(&self, hash: &Hash, auth: Option<&str>) -> ResolverResult<u64> {
        let current = self
            .repos
            .addresses
            .get_raw(hash.as_str())
            .await?
            .ok_or(ResolverError::NotFound)?;

        if !current.deleted {
            return Err(ResolverError::validation("address is not deleted"));
        }

        require_signature(
            auth,
            &current.public_key,
            &address_message(&current.hash, &current.routing_id, current.serial),
        )?;

        let serial = self.repos.addresses.soft_undelete(hash.as_str()).await?;

        info!("address {} restored", hash);
        metrics::record_write("address", "undelete");
        Ok(serial)
    }

    /// Status of a key that was bound to the address at some point
    pub async fn get_key_status(&self, hash: &Hash, fingerprint: &str) -> ResolverResult<KeyStatusInfo> {
        let fingerprint = fingerprint.to_ascii_lowercase();
        let status = self
            .repos
            .addresses
            .get_key_status(hash.as_str(), &fingerprint)
            .await?;

        Ok(KeyStatusInfo {
            hash: hash.to_string(),
            fingerprint,
            status,
        })
    }

    /// Mark a historic or current key normal/compromised, signed by the current key
    pub async fn set_key_status(
        &self,
        hash: &Hash,
        fingerprint: &str,
        status: &str,
        auth: Option<&str>,
    ) -> ResolverResult<KeyStatusInfo> {
        let status: KeyStatus = status.parse()?;
        let fingerprint = fingerprint.to_ascii_lowercase();

        let current = self.repos.addresses.get(hash.as_str()).await?;
        require_signature(
            auth,
            &current.public_key,
            &key_status_message(
                &current.hash,
                &current.routing_id,
                current.serial,
                &fingerprint,
                status.as_str(),
            ),
        )?;

        self.repos
            .addresses
            .set_key_status(hash.as_str(), &fingerprint, status)
            .await?;

        info!("address {} key {} marked {}", hash, fingerprint, status);
        Ok(KeyStatusInfo {
            hash: hash.to_string(),
            fingerprint,
            status,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Clock;
    use crate::engine::testing::{harness, harness_with, key, policy, sign_address, sign_hash, sign_key_status};
    use crate::engine::OrganisationUpload;
    use crate::hash::HashAddress;
    use crate::invite::generate_invite_token;
    use crate::reservation::StaticReservationService;
    use chrono::Duration;

    fn routing(n: u8) -> String {
        Hash::new(format!("routing-{}", n)).to_string()
    }

    fn upload(address: &HashAddress, seed: u8, routing_id: String) -> AddressUpload {
        AddressUpload {
            user_hash: address.local_hash().to_string(),
            org_hash: address.org_hash().to_string(),
            org_token: None,
            public_key: key(seed).public_key().unwrap(),
            routing_id,
            redirect_hash: None,
            proof: Some(ProofOfWork::work(6, address.hash().to_string())),
        }
    }

    fn jay() -> HashAddress {
        HashAddress::parse("jay!").unwrap()
    }

    #[tokio::test]
    async fn test_create_update_and_replay() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();

        let outcome = h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let s0 = h.repos.addresses.get(hash.as_str()).await.unwrap();
        let info = h.engine.get_address(&hash).await.unwrap();
        assert_eq!(info.routing_id, routing(1));
        assert_eq!(info.public_key, key(1).public_key().unwrap());
        assert_eq!(info.serial_number, s0.serial);

        // Update signed with the stored key over hash + R1 + s0
        let auth = sign_address(&s0, &key(1));
        h.clock.advance(Duration::seconds(1));
        let mut update = upload(&address, 2, routing(2));
        update.proof = None;
        let outcome = h.engine.upsert_address(&hash, update.clone(), Some(&auth)).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        let info = h.engine.get_address(&hash).await.unwrap();
        assert_eq!(info.routing_id, routing(2));
        assert_eq!(info.public_key, key(2).public_key().unwrap());
        assert!(info.serial_number > s0.serial);

        // The same signature is stale now
        let err = h.engine.upsert_address(&hash, update, Some(&auth)).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));
    }

    #[tokio::test]
    async fn test_update_requires_current_key() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();
        h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        let current = h.repos.addresses.get(hash.as_str()).await.unwrap();

        for auth in [None, Some(sign_address(&current, &key(9)))] {
            let err = h
                .engine
                .upsert_address(&hash, upload(&address, 2, routing(2)), auth.as_deref())
                .await
                .unwrap_err();
            assert!(matches!(err, ResolverError::Authentication));
        }

        assert_eq!(h.engine.get_address(&hash).await.unwrap().routing_id, routing(1));
    }

    #[tokio::test]
    async fn test_create_validation() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();

        let mut bad = upload(&address, 1, routing(1));
        bad.user_hash = Hash::new("bob").to_string();
        let err = h.engine.upsert_address(&hash, bad, None).await.unwrap_err();
        assert_eq!(err.to_string(), "hash verification failed");

        let bad = upload(&address, 1, "not-a-routing-id".to_string());
        let err = h.engine.upsert_address(&hash, bad, None).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid routing id");

        let bad = upload(&address, 1, String::new());
        let err = h.engine.upsert_address(&hash, bad, None).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid routing id");

        let mut bad = upload(&address, 1, routing(1));
        bad.org_token = Some("token".to_string());
        let err = h.engine.upsert_address(&hash, bad, None).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid data");
    }

    #[tokio::test]
    async fn test_create_proof_of_work() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();

        let mut weak = upload(&address, 1, routing(1));
        weak.proof = Some(ProofOfWork::work(2, hash.to_string()));
        let err = h.engine.upsert_address(&hash, weak, None).await.unwrap_err();
        assert_eq!(err.to_string(), "proof-of-work too weak (need 4 bits)");

        let mut wrong = upload(&address, 1, routing(1));
        wrong.proof = Some(ProofOfWork::work(6, "something else"));
        let err = h.engine.upsert_address(&hash, wrong, None).await.unwrap_err();
        assert_eq!(err.to_string(), "incorrect proof-of-work");

        let mut missing = upload(&address, 1, routing(1));
        missing.proof = None;
        let err = h.engine.upsert_address(&hash, missing, None).await.unwrap_err();
        assert!(matches!(err, ResolverError::ProofOfWork(_)));

        assert!(matches!(h.engine.get_address(&hash).await.unwrap_err(), ResolverError::NotFound));
    }

    /// Registers organisation `acme` with key seed 50
    async fn acme(h: &crate::engine::testing::Harness) -> Hash {
        let org = Hash::new("acme");
        h.engine
            .upsert_organisation(
                &org,
                OrganisationUpload {
                    public_key: key(50).public_key().unwrap(),
                    proof: Some(ProofOfWork::work(6, org.to_string())),
                    validations: vec![],
                },
                None,
            )
            .await
            .unwrap();
        org
    }

    #[tokio::test]
    async fn test_organisation_address_needs_token_and_redirect() {
        let h = harness().await;
        acme(&h).await;

        let personal = jay();
        h.engine
            .upsert_address(&personal.hash(), upload(&personal, 1, routing(1)), None)
            .await
            .unwrap();

        let member = HashAddress::parse("jay@acme!").unwrap();
        let hash = member.hash();

        // Proof-of-work alone is not enough for an organisation address
        let err = h
            .engine
            .upsert_address(&hash, upload(&member, 2, routing(1)), None)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "need org token when creating");

        // Token without redirect
        let expiry = h.clock.now() + Duration::hours(1);
        let token = generate_invite_token(hash.as_str(), &routing(1), expiry, &key(50)).unwrap();
        let mut no_redirect = upload(&member, 2, routing(1));
        no_redirect.org_token = Some(token);
        no_redirect.proof = None;
        let err = h.engine.upsert_address(&hash, no_redirect, None).await.unwrap_err();
        assert_eq!(err.to_string(), "organisation address requires a redirect hash");

        // Token for an empty routing id, pointing at the personal address
        let token = generate_invite_token(hash.as_str(), "", expiry, &key(50)).unwrap();
        let mut invited = upload(&member, 2, String::new());
        invited.org_token = Some(token);
        invited.redirect_hash = Some(personal.hash().to_string());
        invited.proof = None;
        let outcome = h.engine.upsert_address(&hash, invited, None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        // Reads land on the personal record
        let info = h.engine.get_address(&hash).await.unwrap();
        assert_eq!(info.hash, personal.hash().to_string());
        assert_eq!(info.routing_id, routing(1));
    }

    #[tokio::test]
    async fn test_invite_token_failures_are_uniform() {
        let h = harness().await;
        acme(&h).await;
        let personal = jay();
        h.engine
            .upsert_address(&personal.hash(), upload(&personal, 1, routing(1)), None)
            .await
            .unwrap();

        let member = HashAddress::parse("jay@acme!").unwrap();
        let hash = member.hash();
        let now = h.clock.now();

        let tokens = vec![
            // expired
            generate_invite_token(hash.as_str(), "", now - Duration::seconds(1), &key(50)).unwrap(),
            // wrong organisation key
            generate_invite_token(hash.as_str(), "", now + Duration::hours(1), &key(51)).unwrap(),
            // other routing id
            generate_invite_token(hash.as_str(), &routing(3), now + Duration::hours(1), &key(50)).unwrap(),
            "garbage".to_string(),
        ];

        for token in tokens {
            let mut invited = upload(&member, 2, String::new());
            invited.org_token = Some(token);
            invited.redirect_hash = Some(personal.hash().to_string());
            let err = h.engine.upsert_address(&hash, invited, None).await.unwrap_err();
            assert!(matches!(err, ResolverError::Authentication));
        }
    }

    #[tokio::test]
    async fn test_token_for_unknown_organisation() {
        let h = harness().await;
        let member = HashAddress::parse("jay@nowhere!").unwrap();
        let hash = member.hash();
        let token =
            generate_invite_token(hash.as_str(), "", h.clock.now() + Duration::hours(1), &key(50)).unwrap();

        let mut invited = upload(&member, 2, String::new());
        invited.org_token = Some(token);
        invited.redirect_hash = Some(Hash::new("x").to_string());
        let err = h.engine.upsert_address(&hash, invited, None).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));
    }

    #[tokio::test]
    async fn test_redirect_target_must_exist() {
        let h = harness().await;
        let address = jay();
        let mut redirecting = upload(&address, 1, String::new());
        redirecting.redirect_hash = Some(Hash::new("missing").to_string());

        let err = h.engine.upsert_address(&address.hash(), redirecting, None).await.unwrap_err();
        assert_eq!(err.to_string(), "invalid redirect target");
    }

    #[tokio::test]
    async fn test_max_depth_rejected_on_create() {
        let mut p = policy();
        p.max_redirect_depth = 2;
        let h = harness_with(StaticReservationService::new(), p).await;

        let names = ["one!", "two!", "three!"];
        let mut previous: Option<Hash> = None;
        for name in names {
            let address = HashAddress::parse(name).unwrap();
            let mut up = upload(&address, 1, routing(1));
            if let Some(target) = &previous {
                up.routing_id = String::new();
                up.redirect_hash = Some(target.to_string());
            }
            let result = h.engine.upsert_address(&address.hash(), up, None).await;
            if name == "three!" {
                assert_eq!(result.unwrap_err().to_string(), "maximum redirection reached");
            } else {
                result.unwrap();
            }
            previous = Some(address.hash());
        }
    }

    #[tokio::test]
    async fn test_soft_delete_and_undelete() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();
        h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        let original = h.repos.addresses.get(hash.as_str()).await.unwrap();

        let err = h.engine.undelete_address(&hash, Some(&sign_address(&original, &key(1)))).await.unwrap_err();
        assert_eq!(err.to_string(), "address is not deleted");

        let err = h.engine.soft_delete_address(&hash, None).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        h.clock.advance(Duration::seconds(1));
        let serial = h
            .engine
            .soft_delete_address(&hash, Some(&sign_address(&original, &key(1))))
            .await
            .unwrap();
        assert!(serial > original.serial);
        assert!(matches!(h.engine.get_address(&hash).await.unwrap_err(), ResolverError::NotFound));

        // Already hidden
        let hidden = h.repos.addresses.get_raw(hash.as_str()).await.unwrap().unwrap();
        let err = h
            .engine
            .soft_delete_address(&hash, Some(&sign_address(&hidden, &key(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::NotFound));

        // Recreating while hidden is refused
        let err = h.engine.upsert_address(&hash, upload(&address, 3, routing(3)), None).await.unwrap_err();
        assert!(matches!(err, ResolverError::Conflict));

        h.clock.advance(Duration::seconds(1));
        let restored = h
            .engine
            .undelete_address(&hash, Some(&sign_address(&hidden, &key(1))))
            .await
            .unwrap();
        assert!(restored > serial);

        let info = h.engine.get_address(&hash).await.unwrap();
        assert_eq!(info.routing_id, original.routing_id);
        assert_eq!(info.public_key, original.public_key);
        assert_eq!(info.proof, original.proof);
        assert_eq!(info.serial_number, restored);
    }

    #[tokio::test]
    async fn test_hard_delete_after_soft_delete_is_permanent() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();
        h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        let current = h.repos.addresses.get(hash.as_str()).await.unwrap();
        h.engine
            .soft_delete_address(&hash, Some(&sign_address(&current, &key(1))))
            .await
            .unwrap();

        let hidden = h.repos.addresses.get_raw(hash.as_str()).await.unwrap().unwrap();
        h.engine
            .delete_address(&hash, None, Some(&sign_address(&hidden, &key(1))))
            .await
            .unwrap();

        let err = h
            .engine
            .undelete_address(&hash, Some(&sign_address(&hidden, &key(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::NotFound));
    }

    #[tokio::test]
    async fn test_organisation_can_delete_member() {
        let h = harness().await;
        let org = acme(&h).await;
        let personal = jay();
        h.engine
            .upsert_address(&personal.hash(), upload(&personal, 1, routing(1)), None)
            .await
            .unwrap();

        let member = HashAddress::parse("jay@acme!").unwrap();
        let hash = member.hash();
        let token =
            generate_invite_token(hash.as_str(), "", h.clock.now() + Duration::hours(1), &key(50)).unwrap();
        let mut invited = upload(&member, 2, String::new());
        invited.org_token = Some(token);
        invited.redirect_hash = Some(personal.hash().to_string());
        h.engine.upsert_address(&hash, invited, None).await.unwrap();

        let current = h.repos.addresses.get(hash.as_str()).await.unwrap();
        let request = AddressDeleteRequest {
            user_hash: member.local_hash().to_string(),
            org_hash: org.to_string(),
        };

        // Wrong composition
        let wrong = AddressDeleteRequest {
            user_hash: Hash::new("bob").to_string(),
            org_hash: org.to_string(),
        };
        let auth = sign_hash(hash.as_str(), current.serial, &key(50));
        let err = h.engine.delete_address(&hash, Some(wrong), Some(&auth)).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        // Member key is not the organisation key
        let member_auth = sign_hash(hash.as_str(), current.serial, &key(2));
        let err = h
            .engine
            .delete_address(&hash, Some(request.clone()), Some(&member_auth))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        h.engine.delete_address(&hash, Some(request), Some(&auth)).await.unwrap();
        assert!(h.repos.addresses.get_raw(hash.as_str()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_key_status_tracking() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();
        h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        let s0 = h.repos.addresses.get(hash.as_str()).await.unwrap();

        // Rotate to key 2
        let mut rotate = upload(&address, 2, routing(1));
        rotate.proof = None;
        h.clock.advance(Duration::seconds(1));
        h.engine.upsert_address(&hash, rotate, Some(&sign_address(&s0, &key(1)))).await.unwrap();
        let s1 = h.repos.addresses.get(hash.as_str()).await.unwrap();

        let old = key(1).public_key().unwrap().fingerprint();
        assert_eq!(h.engine.get_key_status(&hash, &old).await.unwrap().status, KeyStatus::Normal);

        // Only the current key may flag the old one
        let err = h
            .engine
            .set_key_status(&hash, &old, "compromised", Some(&sign_key_status(&s1, &old, "compromised", &key(1))))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        let err = h
            .engine
            .set_key_status(&hash, &old, "revoked", Some(&sign_key_status(&s1, &old, "revoked", &key(2))))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "invalid status");

        let info = h
            .engine
            .set_key_status(
                &hash,
                &old.to_uppercase(),
                "compromised",
                Some(&sign_key_status(&s1, &old, "compromised", &key(2))),
            )
            .await
            .unwrap();
        assert_eq!(info.status, KeyStatus::Compromised);
        assert_eq!(
            h.engine.get_key_status(&hash, &old).await.unwrap().status,
            KeyStatus::Compromised
        );

        let unknown = key(77).public_key().unwrap().fingerprint();
        let err = h
            .engine
            .set_key_status(&hash, &unknown, "normal", Some(&sign_key_status(&s1, &unknown, "normal", &key(2))))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::NotFound));
        assert!(matches!(
            h.engine.get_key_status(&hash, &unknown).await.unwrap_err(),
            ResolverError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_key_status_header_is_bound_to_the_change() {
        let h = harness().await;
        let address = jay();
        let hash = address.hash();
        h.engine.upsert_address(&hash, upload(&address, 1, routing(1)), None).await.unwrap();
        let s0 = h.repos.addresses.get(hash.as_str()).await.unwrap();
        let fingerprint = key(1).public_key().unwrap().fingerprint();

        let header = sign_key_status(&s0, &fingerprint, "compromised", &key(1));
        h.engine
            .set_key_status(&hash, &fingerprint, "compromised", Some(&header))
            .await
            .unwrap();

        // The same header cannot flip the status back
        let err = h
            .engine
            .set_key_status(&hash, &fingerprint, "normal", Some(&header))
            .await
            .unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));
        assert_eq!(
            h.engine.get_key_status(&hash, &fingerprint).await.unwrap().status,
            KeyStatus::Compromised
        );

        // Nor authorise any other write on the record
        let err = h.engine.delete_address(&hash, None, Some(&header)).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        let mut rotate = upload(&address, 2, routing(1));
        rotate.proof = None;
        let err = h.engine.upsert_address(&hash, rotate, Some(&header)).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        let err = h.engine.soft_delete_address(&hash, Some(&header)).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        assert!(h.engine.get_address(&hash).await.is_ok());
    }
}
