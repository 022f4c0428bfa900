//! Collision-free public identifiers by bounded rejection sampling
//!
//! Draws come uniformly from the configured inclusive range using a
//! cryptographically secure RNG. A draw is rejected if a row visible to the
//! unit of work already holds it, if the unit of work has it staged, or if the
//! same `mint_many` call already returned it. Nothing is remembered between
//! calls, so values from rolled-back or deleted rows become available again.
//! The check-then-insert gap is closed only by the storage unique constraint
//! on the public id field.

use rand::rngs::OsRng;
use rand::{CryptoRng, Rng, RngCore};
use serde_json::Value;
use std::collections::HashSet;

use crate::config::IdentifierConfig;
use crate::errors::{Result, TesseraError};
use crate::model::PublicIdentified;
use crate::persistence::UnitOfWork;
use crate::spec::Filter;

pub struct IdentifierGenerator<R = OsRng> {
    config: IdentifierConfig,
    rng: R,
}

impl IdentifierGenerator<OsRng> {
    /// Generator backed by the operating system RNG
    ///
    /// # Errors
    ///
    /// Returns `Config` for an invalid range or attempt cap.
    pub fn new(config: IdentifierConfig) -> Result<Self> {
        Self::with_rng(config, OsRng)
    }
}

impl<R: RngCore + CryptoRng> IdentifierGenerator<R> {
    /// # Errors
    ///
    /// Returns `Config` for an invalid range or attempt cap.
    pub fn with_rng(config: IdentifierConfig, rng: R) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, rng })
    }

    pub fn config(&self) -> &IdentifierConfig {
        &self.config
    }

    fn draw(&mut self) -> u64 {
        self.rng.gen_range(self.config.min..=self.config.max)
    }

    /// Mint a public id unused by any row of `E`'s table
    ///
    /// # Errors
    ///
    /// Returns `Exhausted` after `max_attempts` rejected draws, or the
    /// storage error raised by the uniqueness check.
    pub async fn mint<E: PublicIdentified>(&mut self, uow: &UnitOfWork) -> Result<u64> {
        self.mint_avoiding::<E>(uow, &HashSet::new()).await
    }

    async fn mint_avoiding<E: PublicIdentified>(
        &mut self,
        uow: &UnitOfWork,
        taken: &HashSet<u64>,
    ) -> Result<u64> {
        let repo = uow.repository::<E>();
        for attempt in 1..=self.config.max_attempts {
            let candidate = self.draw();
            if taken.contains(&candidate)
                || uow.stages_value(E::TABLE, E::PUBLIC_ID_FIELD, &Value::from(candidate))
            {
                continue;
            }
            if repo
                .exists(Filter::eq(E::PUBLIC_ID_FIELD, candidate))
                .await?
            {
                continue;
            }
            tracing::debug!(
                component = module_path!(),
                op = "mint",
                table = E::TABLE,
                attempts = attempt,
            );
            return Ok(candidate);
        }

        tracing::warn!(
            component = module_path!(),
            op = "mint",
            table = E::TABLE,
            attempts = self.config.max_attempts,
            "identifier range exhausted",
        );
        Err(TesseraError::Exhausted {
            table: E::TABLE.to_string(),
            attempts: self.config.max_attempts,
        })
    }

    /// Mint `n` ids, distinct from each other, from staged rows and from
    /// persisted rows
    ///
    /// # Errors
    ///
    /// Same as [`IdentifierGenerator::mint`].
    pub async fn mint_many<E: PublicIdentified>(
        &mut self,
        uow: &UnitOfWork,
        n: usize,
    ) -> Result<Vec<u64>> {
        let mut taken = HashSet::with_capacity(n);
        let mut minted = Vec::with_capacity(n);
        for _ in 0..n {
            let id = self.mint_avoiding::<E>(uow, &taken).await?;
            taken.insert(id);
            minted.push(id);
        }
        Ok(minted)
    }
}
