use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use stockhold_core::{DomainError, DomainResult, ProductId};

/// Snapshot of a product's stock counters.
///
/// Invariant: `available_stock + reserved_stock == total_stock`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub total_stock: u64,
    pub available_stock: u64,
    pub reserved_stock: u64,
}

impl StockLevels {
    pub fn check_invariant(&self) -> DomainResult<()> {
        match self.available_stock.checked_add(self.reserved_stock) {
            Some(sum) if sum == self.total_stock => Ok(()),
            _ => Err(DomainError::invariant(format!(
                "available_stock ({}) + reserved_stock ({}) must equal total_stock ({})",
                self.available_stock, self.reserved_stock, self.total_stock
            ))),
        }
    }

    /// Snapshot as written into audit `old_value`/`new_value`.
    pub fn to_audit_value(&self) -> JsonValue {
        json!({
            "total_stock": self.total_stock,
            "available_stock": self.available_stock,
            "reserved_stock": self.reserved_stock,
        })
    }
}

/// Kind of ledger mutation.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockOperation {
    /// available -> reserved
    Reserve,
    /// reserved -> available
    Release,
    /// reserved -> consumed (leaves total)
    Commit,
    /// new units into total and available
    Restock,
}

/// Record of one committed ledger mutation (before/after counters).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub product_id: ProductId,
    pub operation: StockOperation,
    pub quantity: u64,
    pub before: StockLevels,
    pub after: StockLevels,
}

/// Token for a successful reserve: `quantity` units of `product_id` are held.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockHold {
    adjustment: StockAdjustment,
}

impl StockHold {
    pub fn product_id(&self) -> ProductId {
        self.adjustment.product_id
    }

    pub fn quantity(&self) -> u64 {
        self.adjustment.quantity
    }

    pub fn adjustment(&self) -> &StockAdjustment {
        &self.adjustment
    }

    pub fn into_adjustment(self) -> StockAdjustment {
        self.adjustment
    }
}

/// Stock row for one product.
///
/// All mutations go through `reserve`/`release`/`commit`/`restock`. Each one
/// computes the next counters on a copy, checks preconditions and the invariant,
/// and only then replaces the current counters. A failed mutation leaves the
/// entry untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockEntry {
    product_id: ProductId,
    name: String,
    /// Price in smallest currency unit (e.g., cents).
    unit_price: u64,
    levels: StockLevels,
}

impl StockEntry {
    /// Provision a new product with all units available.
    pub fn provision(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: u64,
        total_stock: u64,
    ) -> DomainResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(DomainError::validation("name cannot be empty"));
        }
        Ok(Self {
            product_id,
            name,
            unit_price,
            levels: StockLevels {
                total_stock,
                available_stock: total_stock,
                reserved_stock: 0,
            },
        })
    }

    /// Rebuild an entry from persisted counters, rejecting rows that break the invariant.
    pub fn from_levels(
        product_id: ProductId,
        name: impl Into<String>,
        unit_price: u64,
        levels: StockLevels,
    ) -> DomainResult<Self> {
        levels.check_invariant()?;
        Ok(Self {
            product_id,
            name: name.into(),
            unit_price,
            levels,
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn unit_price(&self) -> u64 {
        self.unit_price
    }

    pub fn levels(&self) -> StockLevels {
        self.levels
    }

    pub fn total_stock(&self) -> u64 {
        self.levels.total_stock
    }

    pub fn available_stock(&self) -> u64 {
        self.levels.available_stock
    }

    pub fn reserved_stock(&self) -> u64 {
        self.levels.reserved_stock
    }

    pub fn check_invariant(&self) -> DomainResult<()> {
        self.levels.check_invariant()
    }

    /// Move `quantity` units from available to reserved.
    pub fn reserve(&mut self, quantity: u64) -> DomainResult<StockHold> {
        let adjustment = self.mutate(StockOperation::Reserve, quantity, |next| {
            if next.available_stock < quantity {
                return Err(DomainError::insufficient_stock(
                    quantity,
                    next.available_stock,
                ));
            }
            next.available_stock -= quantity;
            next.reserved_stock = add(next.reserved_stock, quantity, "reserved_stock")?;
            Ok(())
        })?;
        Ok(StockHold { adjustment })
    }

    /// Move `quantity` units from reserved back to available.
    ///
    /// Releasing more than is reserved is a defect in the caller, reported as
    /// an invariant violation.
    pub fn release(&mut self, quantity: u64) -> DomainResult<StockAdjustment> {
        self.mutate(StockOperation::Release, quantity, |next| {
            next.reserved_stock = sub(next.reserved_stock, quantity, "reserved_stock")?;
            next.available_stock = add(next.available_stock, quantity, "available_stock")?;
            Ok(())
        })
    }

    /// Consume `quantity` held units (confirmation): they leave reserved and total.
    pub fn commit(&mut self, quantity: u64) -> DomainResult<StockAdjustment> {
        self.mutate(StockOperation::Commit, quantity, |next| {
            next.reserved_stock = sub(next.reserved_stock, quantity, "reserved_stock")?;
            next.total_stock = sub(next.total_stock, quantity, "total_stock")?;
            Ok(())
        })
    }

    /// Receive `quantity` new units into total and available.
    pub fn restock(&mut self, quantity: u64) -> DomainResult<StockAdjustment> {
        self.mutate(StockOperation::Restock, quantity, |next| {
            next.total_stock = add(next.total_stock, quantity, "total_stock")?;
            next.available_stock = add(next.available_stock, quantity, "available_stock")?;
            Ok(())
        })
    }

    fn mutate<F>(
        &mut self,
        operation: StockOperation,
        quantity: u64,
        step: F,
    ) -> DomainResult<StockAdjustment>
    where
        F: FnOnce(&mut StockLevels) -> DomainResult<()>,
    {
        if quantity == 0 {
            return Err(DomainError::validation("quantity must be positive"));
        }

        let before = self.levels;
        before.check_invariant()?;

        let mut after = before;
        step(&mut after)?;
        after.check_invariant()?;

        self.levels = after;
        Ok(StockAdjustment {
            product_id: self.product_id,
            operation,
            quantity,
            before,
            after,
        })
    }
}

fn add(value: u64, quantity: u64, field: &str) -> DomainResult<u64> {
    value
        .checked_add(quantity)
        .ok_or_else(|| DomainError::invariant(format!("{field} overflow")))
}

fn sub(value: u64, quantity: u64, field: &str) -> DomainResult<u64> {
    value.checked_sub(quantity).ok_or_else(|| {
        DomainError::invariant(format!(
            "{field} would go negative ({value} - {quantity})"
        ))
    })
}
