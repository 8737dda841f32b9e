/// Organisation records
use super::{ResolveEngine, WriteOutcome};
use crate::{
    auth::{hash_serial_message, require_signature},
    crypto::PublicKey,
    error::{ResolverError, ResolverResult},
    hash::Hash,
    metrics,
    pow::{ProofOfWork, ProofOfWorkGate},
    repository::{NewRecord, RecordUpdate, ResolveRecord},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Deserialize)]
pub struct OrganisationUpload {
    pub public_key: PublicKey,
    #[serde(default)]
    pub proof: Option<ProofOfWork>,
    #[serde(default)]
    pub validations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct OrganisationInfo {
    pub hash: String,
    pub public_key: PublicKey,
    pub proof: String,
    pub validations: Vec<String>,
    pub serial_number: u64,
}

impl From<ResolveRecord> for OrganisationInfo {
    fn from(record: ResolveRecord) -> Self {
        Self {
            hash: record.hash,
            public_key: record.public_key,
            proof: record.proof,
            validations: record.validations,
            serial_number: record.serial,
        }
    }
}

impl ResolveEngine {
    pub async fn get_organisation(&self, hash: &Hash) -> ResolverResult<OrganisationInfo> {
        let record = self.repos.organisations.get(hash.as_str()).await?;
        Ok(record.into())
    }

    /// Register the organisation (proof-of-work and reservation checked), or
    /// replace its key and validations when it exists
    pub async fn upsert_organisation(
        &self,
        hash: &Hash,
        upload: OrganisationUpload,
        auth: Option<&str>,
    ) -> ResolverResult<WriteOutcome> {
        let current = match self.repos.organisations.get(hash.as_str()).await {
            Ok(record) => Some(record),
            Err(ResolverError::NotFound) => None,
            Err(e) => return Err(e),
        };

        match current {
            None => {
                ProofOfWorkGate::new(self.policy.pow_bits_organisation)
                    .check(upload.proof.as_ref(), hash.as_str())?;

                if !self.reservations.is_validated(hash.as_str(), &upload.public_key).await? {
                    warn!("organisation {} is reserved and no DNS proof was found", hash);
                    return Err(ResolverError::validation(
                        "reserved organisation but validation in DNS not found",
                    ));
                }

                self.repos
                    .organisations
                    .create(NewRecord {
                        hash: hash.to_string(),
                        routing_id: String::new(),
                        redir_hash: String::new(),
                        public_key: upload.public_key,
                        proof: upload.proof.map(|p| p.to_string()).unwrap_or_default(),
                        validations: upload.validations,
                    })
                    .await?;

                info!("organisation {} created", hash);
                metrics::record_write("organisation", "create");
                Ok(WriteOutcome::Created)
            }
            Some(current) => {
                require_signature(
                    auth,
                    &current.public_key,
                    &hash_serial_message(&current.hash, current.serial),
                )?;

                self.repos
                    .organisations
                    .update(
                        &current,
                        RecordUpdate {
                            routing_id: String::new(),
                            redir_hash: String::new(),
                            public_key: upload.public_key,
                            validations: upload.validations,
                        },
                    )
                    .await?;

                info!("organisation {} updated", hash);
                metrics::record_write("organisation", "update");
                Ok(WriteOutcome::Updated)
            }
        }
    }

    pub async fn delete_organisation(&self, hash: &Hash, auth: Option<&str>) -> ResolverResult<()> {
        let current = self.repos.organisations.get(hash.as_str()).await?;
        require_signature(
            auth,
            &current.public_key,
            &hash_serial_message(&current.hash, current.serial),
        )?;

        self.repos.organisations.delete(hash.as_str()).await?;

        info!("organisation {} deleted", hash);
        metrics::record_write("organisation", "delete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{harness, harness_with, key, policy, sign_hash};
    use crate::reservation::{StaticReservationService, TXT_PREFIX};

    fn upload(seed: u8, hash: &Hash, bits: u32) -> OrganisationUpload {
        OrganisationUpload {
            public_key: key(seed).public_key().unwrap(),
            proof: Some(ProofOfWork::work(bits, hash.to_string())),
            validations: vec!["dns acme.example".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_requires_organisation_bits() {
        let h = harness().await;
        let hash = Hash::new("acme");

        // Enough for an address (4) but not an organisation (5)
        let err = h.engine.upsert_organisation(&hash, upload(1, &hash, 4), None).await.unwrap_err();
        assert_eq!(err.to_string(), "proof-of-work too weak (need 5 bits)");

        let outcome = h.engine.upsert_organisation(&hash, upload(1, &hash, 6), None).await.unwrap();
        assert_eq!(outcome, WriteOutcome::Created);

        let info = h.engine.get_organisation(&hash).await.unwrap();
        assert_eq!(info.validations, vec!["dns acme.example".to_string()]);
        assert!(info.proof.starts_with("6$"));
    }

    #[tokio::test]
    async fn test_reserved_organisation_needs_dns_proof() {
        let hash = Hash::new("acme");
        let reservations = StaticReservationService::new().with_reservation(hash.as_str(), &["acme.example"]);
        let h = harness_with(reservations.clone(), policy()).await;

        let err = h.engine.upsert_organisation(&hash, upload(1, &hash, 6), None).await.unwrap_err();
        assert_eq!(err.to_string(), "reserved organisation but validation in DNS not found");

        let txt_name = format!("{}acme.example", TXT_PREFIX);
        let fingerprint = key(1).public_key().unwrap().fingerprint();
        let h = harness_with(reservations.with_txt(&txt_name, &fingerprint), policy()).await;
        h.engine.upsert_organisation(&hash, upload(1, &hash, 6), None).await.unwrap();
    }

    #[tokio::test]
    async fn test_update_and_delete() {
        let h = harness().await;
        let hash = Hash::new("acme");
        h.engine.upsert_organisation(&hash, upload(1, &hash, 6), None).await.unwrap();
        let s0 = h.repos.organisations.get(hash.as_str()).await.unwrap();

        let mut update = upload(2, &hash, 0);
        update.proof = None;
        update.validations = vec![];

        let err = h.engine.upsert_organisation(&hash, update.clone(), None).await.unwrap_err();
        assert!(matches!(err, ResolverError::Authentication));

        let outcome = h
            .engine
            .upsert_organisation(&hash, update, Some(&sign_hash(hash.as_str(), s0.serial, &key(1))))
            .await
            .unwrap();
        assert_eq!(outcome, WriteOutcome::Updated);

        let s1 = h.repos.organisations.get(hash.as_str()).await.unwrap();
        assert_eq!(s1.public_key, key(2).public_key().unwrap());
        assert!(s1.validations.is_empty());
        assert_eq!(s1.proof, s0.proof);

        h.engine
            .delete_organisation(&hash, Some(&sign_hash(hash.as_str(), s1.serial, &key(2))))
            .await
            .unwrap();
        assert!(matches!(
            h.engine.get_organisation(&hash).await.unwrap_err(),
            ResolverError::NotFound
        ));
    }
}
