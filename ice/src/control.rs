//! ICE role and the ICE-CONTROLLING/ICE-CONTROLLED/PRIORITY/USE-CANDIDATE
//! STUN attributes, built on the public `stun` crate's `Setter`/`Getter`
//! traits. `stun::checks` is crate-private upstream, so attribute sizes are
//! validated inline here instead.

use stun::attributes::{ATTR_ICE_CONTROLLED, ATTR_ICE_CONTROLLING, ATTR_PRIORITY, ATTR_USE_CANDIDATE};
use stun::message::{Getter, Message, Setter};

use crate::error::Error;

#[derive(PartialEq, Eq, Debug, Copy, Clone)]
pub enum Role {
    Controlling,
    Controlled,
}

impl Role {
    pub fn flipped(self) -> Role {
        match self {
            Role::Controlling => Role::Controlled,
            Role::Controlled => Role::Controlling,
        }
    }
}

impl Default for Role {
    fn default() -> Self {
        Role::Controlled
    }
}

impl Default for ControlAttr {
    fn default() -> Self {
        ControlAttr {
            role: Role::default(),
            tie_breaker: TieBreaker::default(),
        }
    }
}

#[derive(PartialEq, Eq, Debug, Copy, Clone, Default)]
pub struct TieBreaker(pub u64);

const TIE_BREAKER_SIZE: usize = 8;
const PRIORITY_SIZE: usize = 4;

impl TieBreaker {
    fn add_to_as(&self, m: &mut Message, t: stun::attributes::AttrType) {
        m.add(t, &self.0.to_be_bytes());
    }

    fn get_from_as(m: &Message, t: stun::attributes::AttrType) -> Result<TieBreaker, stun::Error> {
        let v = m.get(t)?;
        if v.len() != TIE_BREAKER_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        let mut b = [0u8; 8];
        b.copy_from_slice(&v);
        Ok(TieBreaker(u64::from_be_bytes(b)))
    }
}

/// ICE-CONTROLLING or ICE-CONTROLLED, depending on the agent's current role.
pub struct ControlAttr {
    pub role: Role,
    pub tie_breaker: TieBreaker,
}

impl Setter for ControlAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        let t = match self.role {
            Role::Controlling => ATTR_ICE_CONTROLLING,
            Role::Controlled => ATTR_ICE_CONTROLLED,
        };
        self.tie_breaker.add_to_as(m, t);
        Ok(())
    }
}

impl Getter for ControlAttr {
    fn get_from(&mut self, m: &Message) -> Result<(), stun::Error> {
        if m.contains(ATTR_ICE_CONTROLLING) {
            self.role = Role::Controlling;
            self.tie_breaker = TieBreaker::get_from_as(m, ATTR_ICE_CONTROLLING)?;
            return Ok(());
        }
        if m.contains(ATTR_ICE_CONTROLLED) {
            self.role = Role::Controlled;
            self.tie_breaker = TieBreaker::get_from_as(m, ATTR_ICE_CONTROLLED)?;
            return Ok(());
        }
        Err(stun::Error::ErrAttributeNotFound)
    }
}

/// Reads whichever of ICE-CONTROLLING/ICE-CONTROLLED is present.
pub fn read_control_attr(m: &Message) -> Result<(Role, TieBreaker), Error> {
    if m.contains(ATTR_ICE_CONTROLLING) {
        return Ok((Role::Controlling, TieBreaker::get_from_as(m, ATTR_ICE_CONTROLLING)?));
    }
    if m.contains(ATTR_ICE_CONTROLLED) {
        return Ok((Role::Controlled, TieBreaker::get_from_as(m, ATTR_ICE_CONTROLLED)?));
    }
    Err(Error::Stun(stun::Error::ErrAttributeNotFound))
}

#[derive(Default, PartialEq, Debug, Copy, Clone)]
pub struct PriorityAttr(pub u32);

impl Setter for PriorityAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_PRIORITY, &self.0.to_be_bytes());
        Ok(())
    }
}

impl PriorityAttr {
    pub fn get_from(m: &Message) -> Result<u32, stun::Error> {
        let v = m.get(ATTR_PRIORITY)?;
        if v.len() != PRIORITY_SIZE {
            return Err(stun::Error::ErrAttributeSizeInvalid);
        }
        Ok(u32::from_be_bytes([v[0], v[1], v[2], v[3]]))
    }
}

#[derive(Default)]
pub struct UseCandidateAttr;

impl Setter for UseCandidateAttr {
    fn add_to(&self, m: &mut Message) -> Result<(), stun::Error> {
        m.add(ATTR_USE_CANDIDATE, &[]);
        Ok(())
    }
}

impl UseCandidateAttr {
    pub fn is_set(m: &Message) -> bool {
        m.get(ATTR_USE_CANDIDATE).is_ok()
    }
}
