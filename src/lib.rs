#![no_std]

mod crossing;

use soroban_sdk::{
    contract, contracterror, contractimpl, contracttype, symbol_short, Address, Env, String,
};

use crossing::Crossing;

/// Metadata identifier shared by every badge; the resolver does not vary by id.
const TOKEN_URI: &str = "ipfs://QmPH2Nc9R1v3AXZmTB16WU1CsXmuKFEKvS6EwBhEnybCni";

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// Global configuration, fixed at initialisation.
#[contracttype]
#[derive(Clone, Debug)]
pub struct Config {
    /// Streaming protocol host trusted to deliver flow lifecycle callbacks.
    pub host: Address,
    /// The watched flow denomination; callbacks for any other token are rejected.
    pub stream_token: Address,
    /// Minimum qualifying flow rate (inclusive).
    pub threshold: i128,
}

#[contracterror]
#[derive(Clone, Copy, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum ContractError {
    Unauthorized = 1,
    AlreadyOwns = 2,
    NotOwned = 3,
    NotMinted = 4,
}

/// Namespace for all contract storage keys.
#[contracttype]
pub enum DataKey {
    Config,            // Instance storage for global settings (host/token/threshold).
    NextTokenId,       // Instance storage for the auto-incrementing badge ID counter.
    Locked,            // Instance storage reentrancy guard, held for one callback.
    FlowRate(Address), // Persistent storage, last observed flow rate per account.
    Owner(u64),        // Persistent storage, badge ID -> holder (live badges only).
    Holding(Address),  // Persistent storage, holder -> badge ID (at most one).
}

// ---------------------------------------------------------------------------
// Storage helpers
// ---------------------------------------------------------------------------

fn get_config(env: &Env) -> Config {
    env.storage()
        .instance()
        .get(&DataKey::Config)
        .expect("contract not initialised: missing config")
}

fn flow_rate(env: &Env, account: &Address) -> i128 {
    env.storage()
        .persistent()
        .get(&DataKey::FlowRate(account.clone()))
        .unwrap_or(0i128)
}

fn set_flow_rate(env: &Env, account: &Address, rate: i128) {
    let key = DataKey::FlowRate(account.clone());
    env.storage().persistent().set(&key, &rate);
    env.storage().persistent().extend_ttl(&key, 17280, 120960);
}

fn clear_flow_rate(env: &Env, account: &Address) {
    env.storage()
        .persistent()
        .remove(&DataKey::FlowRate(account.clone()));
}

fn badge_of(env: &Env, account: &Address) -> u64 {
    env.storage()
        .persistent()
        .get(&DataKey::Holding(account.clone()))
        .unwrap_or(0u64)
}

/// Allocate the next badge ID. IDs start at 1 (0 means "holds nothing") and
/// are never reused, even after a burn.
fn allocate_token_id(env: &Env) -> u64 {
    let token_id: u64 = env
        .storage()
        .instance()
        .get(&DataKey::NextTokenId)
        .unwrap_or(1u64);
    env.storage()
        .instance()
        .set(&DataKey::NextTokenId, &(token_id + 1));
    token_id
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

impl FlowBadge {
    /// Verify a callback comes from the trusted host and concerns the watched
    /// denomination. No state is touched on rejection.
    fn authenticate(
        env: &Env,
        host: &Address,
        stream_token: &Address,
    ) -> Result<(), ContractError> {
        host.require_auth();

        let config = get_config(env);
        if *host != config.host || *stream_token != config.stream_token {
            return Err(ContractError::Unauthorized);
        }
        Ok(())
    }

    /// Take the reentrancy lock for the duration of one callback. A nested
    /// re-entry observing partially-applied state is a correctness violation,
    /// so it traps instead.
    fn lock(env: &Env) {
        if env
            .storage()
            .instance()
            .get(&DataKey::Locked)
            .unwrap_or(false)
        {
            panic!("reentrant callback");
        }
        env.storage().instance().set(&DataKey::Locked, &true);
    }

    fn unlock(env: &Env) {
        env.storage().instance().remove(&DataKey::Locked);
    }

    /// Mint a badge to `account`. One live badge per account, ever.
    fn mint(env: &Env, account: &Address) -> Result<u64, ContractError> {
        if badge_of(env, account) != 0 {
            return Err(ContractError::AlreadyOwns);
        }

        let token_id = allocate_token_id(env);

        let owner_key = DataKey::Owner(token_id);
        env.storage().persistent().set(&owner_key, account);
        env.storage()
            .persistent()
            .extend_ttl(&owner_key, 17280, 120960);

        let holding_key = DataKey::Holding(account.clone());
        env.storage().persistent().set(&holding_key, &token_id);
        env.storage()
            .persistent()
            .extend_ttl(&holding_key, 17280, 120960);

        env.events()
            .publish((symbol_short!("minted"), account.clone()), token_id);

        Ok(token_id)
    }

    /// Burn the badge held by `account`, returning the retired ID.
    /// The ID is never reassigned.
    fn burn(env: &Env, account: &Address) -> Result<u64, ContractError> {
        let token_id = badge_of(env, account);
        if token_id == 0 {
            return Err(ContractError::NotOwned);
        }

        env.storage().persistent().remove(&DataKey::Owner(token_id));
        env.storage()
            .persistent()
            .remove(&DataKey::Holding(account.clone()));

        env.events()
            .publish((symbol_short!("burned"), account.clone()), token_id);

        Ok(token_id)
    }

    /// Shared transition for the create and update callbacks: classify the
    /// rate change against the stored snapshot, mint or burn on a crossing,
    /// then record the new rate. An account with no snapshot is treated as
    /// previously at rate 0, which covers both a fresh flow and an update
    /// delivered for an unseen account.
    fn apply_rate(env: &Env, account: &Address, new_rate: i128) -> Result<(), ContractError> {
        let previous_rate = flow_rate(env, account);
        let threshold = get_config(env).threshold;

        match crossing::classify(previous_rate, new_rate, threshold) {
            Crossing::Up => {
                Self::mint(env, account)?;
            }
            Crossing::Down => {
                Self::burn(env, account)?;
            }
            Crossing::None => {}
        }

        set_flow_rate(env, account, new_rate);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Contract Implementation
// ---------------------------------------------------------------------------

#[contract]
pub struct FlowBadge;

#[contractimpl]
impl FlowBadge {
    /// Initialise the contract with the trusted host, the watched stream
    /// denomination and the qualifying flow-rate threshold.
    ///
    /// This function must be called exactly once before any other contract
    /// operation. All three values are immutable afterwards.
    ///
    /// # Parameters
    /// - `host`: Address of the streaming protocol host; only callbacks
    ///   authorised by this address mutate state
    /// - `stream_token`: Address of the flow denomination this contract
    ///   watches; callbacks for other tokens are rejected
    /// - `threshold`: Minimum flow rate (inclusive) that qualifies an account
    ///   for a badge; must be positive
    ///
    /// # Storage
    /// - Stores `Config { host, stream_token, threshold }` in instance storage
    /// - Initialises the badge ID counter to 1 (ID 0 is the "none" sentinel)
    /// - Extends TTL to prevent premature expiration (17280 ledgers threshold, 120960 max)
    ///
    /// # Panics
    /// - If called more than once (contract already initialised)
    /// - If `threshold` is not positive
    pub fn init(env: Env, host: Address, stream_token: Address, threshold: i128) {
        if env.storage().instance().has(&DataKey::Config) {
            panic!("already initialised");
        }
        assert!(threshold > 0, "threshold must be positive");

        let config = Config {
            host,
            stream_token,
            threshold,
        };
        env.storage().instance().set(&DataKey::Config, &config);
        env.storage().instance().set(&DataKey::NextTokenId, &1u64);

        // Ensure instance storage (Config/counter) doesn't expire quickly
        env.storage().instance().extend_ttl(17280, 120960);
    }

    /// Callback for a newly created flow towards this contract.
    ///
    /// If the new rate meets the threshold the account is minted a badge;
    /// otherwise only the rate snapshot is recorded. A rate exactly equal to
    /// the threshold qualifies (inclusive comparison).
    ///
    /// # Parameters
    /// - `host`: The calling protocol host; must match the configured host and
    ///   authorise the invocation
    /// - `account`: The flow sender the callback concerns
    /// - `new_rate`: The protocol's authoritative rate for the new flow
    /// - `stream_token`: Denomination of the flow; must match the watched one
    ///
    /// # Errors
    /// - `Unauthorized` if the host or denomination does not match; no mutation
    /// - `AlreadyOwns` if the account already holds a badge while the stored
    ///   snapshot says it should not; indicates an ordering bug upstream, and
    ///   the rejection reverts the whole callback
    ///
    /// # Events
    /// - Publishes `minted(account, token_id)` when a badge is granted
    ///
    /// # Usage Notes
    /// - A duplicate delivery of the same callback classifies as no crossing
    ///   and mints nothing
    /// - Transaction is atomic: on any error no snapshot or badge state is
    ///   persisted
    pub fn on_flow_created(
        env: Env,
        host: Address,
        account: Address,
        new_rate: i128,
        stream_token: Address,
    ) -> Result<(), ContractError> {
        Self::authenticate(&env, &host, &stream_token)?;

        Self::lock(&env);
        let applied = Self::apply_rate(&env, &account, new_rate);
        Self::unlock(&env);
        applied
    }

    /// Callback for a flow whose rate changed.
    ///
    /// Mints on an upward threshold crossing, burns on a downward one, and
    /// only refreshes the rate snapshot when the rate stays on one side. The
    /// protocol delivers the new rate without the old one, so classification
    /// runs against the locally stored snapshot; an update for an account this
    /// contract has never seen is treated as starting from rate 0.
    ///
    /// # Errors
    /// - `Unauthorized` if the host or denomination does not match; no mutation
    ///
    /// # Events
    /// - Publishes `minted(account, token_id)` or `burned(account, token_id)`
    ///   on a crossing
    pub fn on_flow_updated(
        env: Env,
        host: Address,
        account: Address,
        new_rate: i128,
        stream_token: Address,
    ) -> Result<(), ContractError> {
        Self::authenticate(&env, &host, &stream_token)?;

        Self::lock(&env);
        let applied = Self::apply_rate(&env, &account, new_rate);
        Self::unlock(&env);
        applied
    }

    /// Callback for a deleted flow.
    ///
    /// Burns the account's badge if it holds one and clears the rate snapshot.
    /// Rejecting a deletion would trap the host's teardown of the flow, so
    /// apart from authentication this entry point cannot fail: an account that
    /// unexpectedly holds no badge is a silent no-op, never an error.
    ///
    /// # Errors
    /// - `Unauthorized` if the host or denomination does not match; no mutation
    ///
    /// # Events
    /// - Publishes `burned(account, token_id)` when a badge is revoked
    /// - Publishes `flowdel(account)` once the snapshot is cleared
    pub fn on_flow_deleted(
        env: Env,
        host: Address,
        account: Address,
        stream_token: Address,
    ) -> Result<(), ContractError> {
        Self::authenticate(&env, &host, &stream_token)?;

        Self::lock(&env);

        if badge_of(&env, &account) != 0 {
            // Teardown must not trap the host, so a burn failure is absorbed.
            let _ = Self::burn(&env, &account);
        }
        clear_flow_rate(&env, &account);

        env.events()
            .publish((symbol_short!("flowdel"), account), ());

        Self::unlock(&env);
        Ok(())
    }

    /// Return the holder of a live badge.
    ///
    /// # Errors
    /// - `NotMinted` if no live badge has this ID (covers both never-minted
    ///   and already-burned IDs)
    pub fn owner_of(env: Env, token_id: u64) -> Result<Address, ContractError> {
        env.storage()
            .persistent()
            .get(&DataKey::Owner(token_id))
            .ok_or(ContractError::NotMinted)
    }

    /// Return the badge ID held by `account`, or 0 if it holds none.
    /// Never fails.
    pub fn nft_owned(env: Env, account: Address) -> u64 {
        badge_of(&env, &account)
    }

    /// Return the metadata URI for a live badge. Every badge resolves to the
    /// same fixed identifier regardless of ID.
    ///
    /// # Errors
    /// - `NotMinted` under the same condition as `owner_of`
    pub fn token_uri(env: Env, token_id: u64) -> Result<String, ContractError> {
        if !env.storage().persistent().has(&DataKey::Owner(token_id)) {
            return Err(ContractError::NotMinted);
        }
        Ok(String::from_str(&env, TOKEN_URI))
    }

    /// Return the last observed flow rate for `account` (0 if none recorded).
    pub fn flow_rate_of(env: Env, account: Address) -> i128 {
        flow_rate(&env, &account)
    }

    /// Return the global configuration (host, watched token, threshold).
    pub fn get_config(env: Env) -> Config {
        get_config(&env)
    }
}
