//! Known mainnet staking deployments
//!
//! The production set of derived sources and the addresses they read.
//! `default_derived_sources` returns them in execution order; order is a
//! contract because later sources may read the output of earlier ones
//! (none do today, but every anchor must already be priced by a primary
//! source before its wrapper runs).

use solana_sdk::pubkey;
use solana_sdk::pubkey::Pubkey;
use std::sync::Arc;

use crate::cache::AccountCache;
use crate::rpc::AccountReader;
use crate::sources::derived::{
    ConstantMultipleSource, MultiStakedVaultSource, StakedVaultOutput, StakedVaultSource,
};
use crate::sources::oracle::OracleSource;
use crate::sources::simulated::SimulatedStakeSource;
use crate::sources::DerivedSource;

// STEP staking: xSTEP rate comes from the staking program's emit_price
pub const STEP_MINT: Pubkey = pubkey!("StepAscQoEioFxxWGnh2sLBDFp9d8rvKz2Yp39iDpyT");
/// Switchboard aggregator publishing the STEP/USD price
pub const STEP_ORACLE_FEED: Pubkey = pubkey!("CdvmFaR2m3cL2YuDg9cSb2m3nKZX26vyVoBbB8aNMWaj");
pub const XSTEP_MINT: Pubkey = pubkey!("xStpgUCss9piqeFUk2iLVcvJEGhAdJxJQuwLkXP555G");
pub const XSTEP_VAULT: Pubkey = pubkey!("ANYxxG365hutGYaTdtUQG8u2hC4dFX9mFHKuzy9ABQJi");
pub const STEP_STAKING_PROGRAM: Pubkey = pubkey!("Stk5NCWomVN3itaFjLu382u9ibb5jMSHEsh6CuhaGjB");
/// Read-only nominal payer for simulations; nothing is signed or spent
pub const SIMULATION_PAYER: Pubkey = pubkey!("GkT2mRSujbydLUmA178ykHe7hZtaUpkmX2sfwS8suWb3");

// TULIP staking
pub const TULIP_MINT: Pubkey = pubkey!("TuLipcqtGVXP9XR62wM8WWCm6a9vhLs7T1uoWBk6FDs");
pub const STULIP_MINT: Pubkey = pubkey!("STuLiPmUCUtG1hQcwdc9de9sjYhVsYoucCiWqbApbpM");
pub const STULIP_VAULT: Pubkey = pubkey!("82aST5b1s1ZEB8dP7sDLjLYNRC85sGKmjmYtyeWVnyjz");

// BASIS staking
pub const BASIS_MINT: Pubkey = pubkey!("Basis9oJw9j8cw53oMV7iqsgo6ihi9ALw4QR31rcjUJa");
pub const RBASIS_MINT: Pubkey = pubkey!("rBsH9ME52axhqSjAVXY3t1xcCrmntVNvP3X16pRjVdM");
pub const RBASIS_VAULT: Pubkey = pubkey!("3sBX8hj4URsiBCSRV26fEHkake295fQnM44EYKKsSs51");

// Invictus: two wrappers over the same anchor
pub const IN_MINT: Pubkey = pubkey!("inL8PMVd6iiW3RCBJnr5AsrRN6nqr4BTrcNuQWQSkvY");
pub const SIN_MINT: Pubkey = pubkey!("sinjBMHhAuvywW3o87uXHswuRXb3c7TfqgAdocedtDj");
pub const SIN_VAULT: Pubkey = pubkey!("5EZiwr4fE1rbxpzQUWQ6N9ppkEridNwbH3dU3xUf7wPZ");
pub const LSIN_MINT: Pubkey = pubkey!("LsinpBtQH68hzHqrvWw4PYbH7wMoAobQAzcvxVHwTLv");
pub const LSIN_VAULT: Pubkey = pubkey!("oybxAeqZ1zqricePm6skfNVtY9uHhACzazoKvcUXKXA");

// MSRM is defined as exactly one million SRM
pub const SRM_MINT: Pubkey = pubkey!("SRMuApVNdxXokk5GT7XD5cUUgXMBCoAz2LHeuAoKWRt");
pub const MSRM_MINT: Pubkey = pubkey!("MSRMcoVyrFxnSgo5uXwone5SKcGhT1KEJMFEkMEWf9L");
pub const MSRM_PER_SRM: u64 = 1_000_000;

/// Oracle feeds applied after the primary merge and before the derived
/// chain, so wrappers (xSTEP) derive from the oracle-corrected anchor
pub fn default_oracle_sources(reader: Arc<dyn AccountReader>) -> Vec<OracleSource> {
    vec![OracleSource::new(
        reader,
        "STEP",
        STEP_MINT,
        STEP_ORACLE_FEED,
    )]
}

pub fn default_derived_sources(
    cache: Arc<AccountCache>,
    reader: Arc<dyn AccountReader>,
) -> Vec<Box<dyn DerivedSource>> {
    vec![
        Box::new(SimulatedStakeSource::new(
            reader.clone(),
            "xSTEP",
            STEP_MINT,
            XSTEP_MINT,
            XSTEP_VAULT,
            STEP_STAKING_PROGRAM,
            SIMULATION_PAYER,
        )),
        Box::new(StakedVaultSource::new(
            reader.clone(),
            "sTULIP",
            TULIP_MINT,
            STULIP_MINT,
            STULIP_VAULT,
        )),
        Box::new(StakedVaultSource::new(
            reader,
            "rBASIS",
            BASIS_MINT,
            RBASIS_MINT,
            RBASIS_VAULT,
        )),
        Box::new(MultiStakedVaultSource::new(
            cache,
            "invictus",
            IN_MINT,
            vec![
                StakedVaultOutput {
                    symbol: "sIN".to_string(),
                    derived_mint: SIN_MINT,
                    vault: SIN_VAULT,
                },
                StakedVaultOutput {
                    symbol: "lsIN".to_string(),
                    derived_mint: LSIN_MINT,
                    vault: LSIN_VAULT,
                },
            ],
        )),
        Box::new(ConstantMultipleSource::new(
            "MSRM",
            SRM_MINT,
            MSRM_MINT,
            MSRM_PER_SRM,
        )),
    ]
}
