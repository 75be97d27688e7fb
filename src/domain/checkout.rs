//! Checkout Orchestrator
//!
//! Walks a session through `Information -> Shipping -> Payment -> Review`,
//! validating each step before moving on, and turns the accumulated input
//! plus the cart into a single order submission.

use async_trait::async_trait;
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Cart, CartItem, CartStorage, Order, PaymentMethod};
use crate::domain::draft::{Address, ContactInfo, DraftItem, FieldErrors, OrderDetails, OrderDraft};
use crate::domain::pricing::{PricingPolicy, ShippingOption, Totals};
use crate::identity::Caller;
use crate::StorefrontError;

/// Where a finished draft goes. Implemented by the order service in-process.
#[async_trait]
pub trait OrderSubmitter: Send + Sync {
    async fn submit_order(&self, draft: OrderDraft, caller: &Caller, idempotency_key: Option<Uuid>) -> Result<Order, StorefrontError>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    Information,
    Shipping,
    Payment,
    Review,
    Confirmed,
}

impl CheckoutStep {
    fn next(self) -> Self {
        match self {
            Self::Information => Self::Shipping,
            Self::Shipping => Self::Payment,
            Self::Payment => Self::Review,
            Self::Review | Self::Confirmed => Self::Confirmed,
        }
    }

    fn previous(self) -> Self {
        match self {
            Self::Information | Self::Shipping => Self::Information,
            Self::Payment => Self::Shipping,
            Self::Review => Self::Payment,
            Self::Confirmed => Self::Confirmed,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Validate)]
pub struct InformationForm {
    #[validate]
    pub contact: ContactInfo,
    #[validate]
    pub shipping_address: Address,
    #[validate(length(max = 1000, message = "notes must be at most 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Validate)]
pub struct PaymentForm {
    pub payment_method: PaymentMethod,
    pub billing_same_as_shipping: bool,
    #[validate]
    pub billing_address: Option<Address>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum StepInput {
    Information(InformationForm),
    Shipping(ShippingOption),
    Payment(PaymentForm),
}

impl StepInput {
    fn step(&self) -> CheckoutStep {
        match self {
            Self::Information(_) => CheckoutStep::Information,
            Self::Shipping(_) => CheckoutStep::Shipping,
            Self::Payment(_) => CheckoutStep::Payment,
        }
    }
}

/// Read-only summary rendered on the review step.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewSummary {
    pub contact: ContactInfo,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub shipping_option: ShippingOption,
    pub payment_method: PaymentMethod,
    pub notes: Option<String>,
    pub items: Vec<CartItem>,
    pub totals: Totals,
}

#[derive(Debug, thiserror::Error)]
pub enum CheckoutError {
    #[error("the cart is empty")]
    EmptyCart,
    #[error("expected input for the {expected:?} step, got {got:?}")]
    WrongStep { expected: CheckoutStep, got: CheckoutStep },
    #[error("validation failed: {0}")]
    Validation(FieldErrors),
    #[error("orders can only be submitted from the review step")]
    NotReviewing,
    #[error("this checkout has already been submitted")]
    AlreadySubmitted,
    #[error("order submission failed: {source}")]
    Submission {
        #[source]
        source: StorefrontError,
        retryable: bool,
    },
}

#[derive(Debug)]
pub struct CheckoutWizard<'c, S: CartStorage> {
    cart: &'c mut Cart<S>,
    caller: Caller,
    pricing: PricingPolicy,
    step: CheckoutStep,
    information: Option<InformationForm>,
    shipping_option: Option<ShippingOption>,
    payment: Option<PaymentForm>,
    /// Sent with every attempt at the same draft so retries cannot duplicate
    /// the order. Replaced when the draft changes between attempts.
    idempotency_key: Uuid,
    last_submitted: Option<OrderDraft>,
    last_error: Option<String>,
    confirmation: Option<Order>,
}

impl<'c, S: CartStorage> CheckoutWizard<'c, S> {
    pub fn new(cart: &'c mut Cart<S>, caller: Caller, pricing: PricingPolicy) -> Result<Self, CheckoutError> {
        if cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        Ok(Self {
            cart,
            caller,
            pricing,
            step: CheckoutStep::Information,
            information: None,
            shipping_option: None,
            payment: None,
            idempotency_key: Uuid::new_v4(),
            last_submitted: None,
            last_error: None,
            confirmation: None,
        })
    }

    pub fn step(&self) -> CheckoutStep { self.step }
    pub fn last_error(&self) -> Option<&str> { self.last_error.as_deref() }
    pub fn confirmation(&self) -> Option<&Order> { self.confirmation.as_ref() }
    pub fn information(&self) -> Option<&InformationForm> { self.information.as_ref() }
    pub fn shipping_option(&self) -> Option<ShippingOption> { self.shipping_option }
    pub fn payment(&self) -> Option<&PaymentForm> { self.payment.as_ref() }

    /// Totals for the live cart with the chosen (or default) shipping option.
    pub fn totals(&self) -> Totals {
        self.cart.totals(&self.pricing, self.shipping_option.unwrap_or_default())
    }

    /// Validates the current step's input and moves forward. On a validation
    /// failure the wizard stays where it is.
    pub fn advance(&mut self, input: StepInput) -> Result<CheckoutStep, CheckoutError> {
        if input.step() != self.step {
            return Err(CheckoutError::WrongStep { expected: self.step, got: input.step() });
        }
        match input {
            StepInput::Information(form) => {
                form.validate().map_err(|e| CheckoutError::Validation(FieldErrors::from_validation(&e, "")))?;
                self.information = Some(form);
            }
            StepInput::Shipping(option) => self.shipping_option = Some(option),
            StepInput::Payment(form) => {
                let mut errors = match form.validate() {
                    Ok(()) => FieldErrors::default(),
                    Err(e) => FieldErrors::from_validation(&e, ""),
                };
                if !form.billing_same_as_shipping && form.billing_address.is_none() {
                    errors.add("billingAddress", "billing address is required");
                }
                errors.into_result().map_err(CheckoutError::Validation)?;
                self.payment = Some(form);
            }
        }
        self.step = self.step.next();
        Ok(self.step)
    }

    /// Returns to the previous step, keeping everything entered so far.
    pub fn back(&mut self) -> CheckoutStep {
        self.step = self.step.previous();
        self.step
    }

    pub fn review(&self) -> Result<ReviewSummary, CheckoutError> {
        if self.step != CheckoutStep::Review {
            return Err(CheckoutError::NotReviewing);
        }
        let draft = self.draft()?;
        Ok(ReviewSummary {
            billing_address: draft.billing_address().clone(),
            contact: draft.order_data.contact,
            shipping_address: draft.order_data.shipping_address,
            shipping_option: draft.order_data.shipping_option,
            payment_method: draft.order_data.payment_method,
            notes: draft.order_data.notes,
            items: self.cart.items().to_vec(),
            totals: self.totals(),
        })
    }

    /// Assembles the submission from the collected steps and the cart.
    pub fn draft(&self) -> Result<OrderDraft, CheckoutError> {
        let (Some(info), Some(shipping_option), Some(payment)) = (&self.information, self.shipping_option, &self.payment) else {
            return Err(CheckoutError::NotReviewing);
        };
        if self.cart.is_empty() {
            return Err(CheckoutError::EmptyCart);
        }
        let order_items = self
            .cart
            .items()
            .iter()
            .map(|item| DraftItem {
                product_id: item.product_id,
                name: item.name.clone(),
                unit_price: item.unit_price.amount(),
                quantity: item.quantity,
                image_ref: item.image_ref.clone(),
            })
            .collect();
        Ok(OrderDraft {
            order_data: OrderDetails {
                contact: info.contact.clone(),
                shipping_address: info.shipping_address.clone(),
                billing_same_as_shipping: payment.billing_same_as_shipping,
                billing_address: payment.billing_address.clone(),
                shipping_option,
                payment_method: payment.payment_method,
                notes: info.notes.clone(),
                client_totals: Some(self.totals()),
            },
            order_items,
        })
    }

    /// Sends the order. Success empties the cart and confirms the checkout;
    /// failure leaves cart and input untouched on the review step.
    pub async fn submit(&mut self, submitter: &dyn OrderSubmitter) -> Result<&Order, CheckoutError> {
        match self.step {
            CheckoutStep::Review => {}
            CheckoutStep::Confirmed => return Err(CheckoutError::AlreadySubmitted),
            _ => return Err(CheckoutError::NotReviewing),
        }
        let draft = self.draft()?;
        if self.last_submitted.as_ref().is_some_and(|sent| sent != &draft) {
            self.idempotency_key = Uuid::new_v4();
        }
        self.last_submitted = Some(draft.clone());
        match submitter.submit_order(draft, &self.caller, Some(self.idempotency_key)).await {
            Ok(order) => {
                tracing::info!(order_id = %order.id, order_number = %order.order_number, "checkout confirmed");
                self.cart.clear();
                self.last_error = None;
                self.step = CheckoutStep::Confirmed;
                Ok(&*self.confirmation.insert(order))
            }
            Err(source) => {
                tracing::warn!(error = %source, "order submission failed");
                self.last_error = Some(source.to_string());
                let retryable = source.is_retryable();
                Err(CheckoutError::Submission { source, retryable })
            }
        }
    }
}
