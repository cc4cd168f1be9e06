//! The Karigai storefront journey suite.
//!
//! Each journey is a scripted walk through the storefront at the configured
//! base URL, transcribed from recorded user sessions. Element paths are
//! structural and tied to the storefront's current markup; when the layout
//! changes, the paths change with it.
//!
//! The initial navigation to the base URL is the runner's job, so no journey
//! starts with a navigate step. Mid-journey navigations (page reloads) are
//! ordinary steps.

use std::time::Duration;

use crate::locator::ElementRef;
use crate::scenario::{AssertionSpec, Scenario, ScenarioStep};

/// Confirmation banners in the recorded sessions were checked with a tight
/// bound; kept as recorded.
const CONFIRM_TIMEOUT: Duration = Duration::from_secs(1);

// Elements shared across journeys.
const QUICK_ADD: &str = "html/body/div/div/main/div/section/div/div[2]/div/div/a/div/div[3]/div/button";
const OPEN_CART: &str = "html/body/div/div/header/div/div[2]/nav/button";
const SIGN_IN_LINK: &str = "html/body/div/div/header/div/div[2]/nav/div/a";
const ACCOUNT_MENU: &str = "html/body/div/div/header/div/div[2]/nav/div/button";
const AUTH_EMAIL: &str = "html/body/div/div/main/div/div/form/div/div/input";
const AUTH_PASSWORD: &str = "html/body/div/div/main/div/div/form/div/div[2]/input";
const AUTH_SIGNUP_PASSWORD: &str = "html/body/div/div/main/div/div/form/div/div[3]/input";
const AUTH_SUBMIT: &str = "html/body/div/div/main/div/div/form/div/button";
const SIGN_UP_LINK: &str = "html/body/div/div/main/div/div/div[2]/span/a";
const FORGOT_PASSWORD_LINK: &str = "html/body/div/div/main/div/div/div[2]/a";
const RESET_EMAIL: &str = "html/body/div/div/main/div/div/div[2]/form/div/input";
const RESET_SUBMIT: &str = "html/body/div/div/main/div/div/div[2]/form/button";
const BACK_TO_LOGIN: &str = "html/body/div/div/main/div/div/div[2]/button";

// Checkout form fields.
const CHECKOUT_NAME: &str = "html/body/div/div/main/div/div/div[2]/div/form/div/div/div/input";
const CHECKOUT_EMAIL: &str = "html/body/div/div/main/div/div/div[2]/div/form/div/div/div[2]/input";
const CHECKOUT_STREET: &str = "html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div/div/input";
const CHECKOUT_CITY: &str = "html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[2]/div/input";
const CHECKOUT_STATE: &str = "html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[2]/div[2]/input";
const CHECKOUT_ZIP: &str = "html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[3]/input";
const CHECKOUT_PHONE: &str = "html/body/div/div/main/div/div/div[2]/div/form/div[6]/div/input";
const CHECKOUT_SUBMIT: &str = "html/body/div/div/main/div/div/div[2]/div/form/button";

fn click(path: &str) -> ScenarioStep {
    ScenarioStep::Click {
        target: ElementRef::path(path),
        timeout: None,
    }
}

fn fill(path: &str, value: &str) -> ScenarioStep {
    ScenarioStep::Fill {
        target: ElementRef::path(path),
        value: value.to_string(),
        timeout: None,
    }
}

fn see(text: &str) -> AssertionSpec {
    AssertionSpec::visible_text(text)
}

/// Add a product, exercise the cart's quantity controls, remove it, close
/// the overlay.
pub fn cart_management() -> Scenario {
    Scenario::new(
        "cart_management",
        "Add a product to the cart and manage quantities",
    )
    .step(click(QUICK_ADD))
    .step(click(OPEN_CART))
    // Quantity '+' then '-', then remove and close the overlay.
    .step(click("html/body/div[3]/div[2]/div/div/div/div/div[2]/div[3]/button[2]"))
    .step(click("html/body/div[3]/div[2]/div/div/div/div/div[2]/div[3]/button"))
    .step(click("html/body/div[3]/div[2]/div/div/div/div/div[2]/div/button"))
    .step(click("html/body/div[3]/button"))
    .assert(see("Redwine soap"))
    .assert(see("₹100.00"))
    .assert(see("₹200.00"))
    .assert(see("50% OFF"))
    .assert(see("Open cart"))
}

/// Full checkout with a valid address form. The recorded session expected
/// the failed-verification banner rather than a success page; kept verbatim.
pub fn checkout_payment() -> Scenario {
    Scenario::new(
        "checkout_payment",
        "Checkout flow through the Razorpay payment step",
    )
    .step(click(QUICK_ADD))
    .step(click(OPEN_CART))
    .step(click(QUICK_ADD))
    .step(click("html/body/div[3]/div[3]/a"))
    .step(fill(CHECKOUT_NAME, "Test User"))
    .step(fill(CHECKOUT_EMAIL, "testuser@example.com"))
    .step(fill(CHECKOUT_STREET, "123 Test Street"))
    .step(fill(CHECKOUT_CITY, "Test City"))
    .step(fill(CHECKOUT_STATE, "Test State"))
    .step(fill(CHECKOUT_ZIP, "123456"))
    .step(fill(CHECKOUT_PHONE, "9876543210"))
    .step(click("html/body/div/div/footer/div/div/div/a"))
    .assert(see("Order Failed: Payment Not Verified").with_timeout(CONFIRM_TIMEOUT))
}

/// A non-10-digit phone number must keep purchase completion blocked; no
/// payment confirmation may appear.
pub fn checkout_invalid_phone() -> Scenario {
    Scenario::new(
        "checkout_invalid_phone",
        "Invalid phone number blocks purchase completion",
    )
    .step(click(QUICK_ADD))
    .step(click(OPEN_CART))
    .step(click("html/body/div[3]/div[3]/a"))
    .step(fill(CHECKOUT_NAME, "Test User"))
    .step(fill(CHECKOUT_EMAIL, "testuser@example.com"))
    .step(fill(CHECKOUT_STREET, "123 Test Street"))
    .step(fill(CHECKOUT_CITY, "Test City"))
    .step(fill(CHECKOUT_STATE, "Test State"))
    .step(fill(CHECKOUT_ZIP, "123456"))
    .step(fill(CHECKOUT_PHONE, "12345"))
    .step(click(CHECKOUT_SUBMIT))
    .assert(AssertionSpec::hidden_text("Payment Successful").with_timeout(Duration::from_secs(5)))
    .assert(AssertionSpec::hidden_text("Order Confirmation Success").with_timeout(Duration::from_secs(5)))
    .assert(see("Phone Number"))
}

/// Sign in (falling back to sign-up for a fresh account), edit name and
/// phone on the profile page, save, reload.
pub fn profile_update() -> Scenario {
    Scenario::new(
        "profile_update",
        "Update personal info on the profile page",
    )
    .step(click(SIGN_IN_LINK))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(SIGN_UP_LINK))
    .step(fill(AUTH_EMAIL, "John Doe"))
    .step(fill(AUTH_PASSWORD, "john.doe@example.com"))
    .step(fill(AUTH_SIGNUP_PASSWORD, "SecurePass123!"))
    .step(click(AUTH_SUBMIT))
    .step(click(ACCOUNT_MENU))
    .step(click("html/body/div[2]/div/a"))
    .step(fill("html/body/div/div/main/div/div/div[2]/div/div[2]/form/div/input", "Johnathan Doe"))
    .step(fill("html/body/div/div/main/div/div/div[2]/div/div[2]/form/div[2]/input", "123-456-7890"))
    .step(click("html/body/div/div/main/div/div/div[2]/div/div[2]/form/button"))
    .step(ScenarioStep::Navigate {
        url: "/profile".to_string(),
    })
    .assert(see("Profile"))
    .assert(see("Manage your profile information"))
    .assert(see("Name"))
    .assert(see("Phone"))
    .assert(see("Email"))
    .assert(see("Email cannot be changed"))
    .assert(see("Save Changes"))
}

/// Account creation and password-reset round trip on the way to the address
/// book. Includes explicit field clears before re-entry.
pub fn address_book() -> Scenario {
    Scenario::new(
        "address_book",
        "Address book management behind the auth flow",
    )
    .step(click(SIGN_IN_LINK))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(SIGN_UP_LINK))
    .step(fill(AUTH_EMAIL, "John Doe"))
    .step(fill(AUTH_PASSWORD, "john.doe@example.com"))
    .step(fill(AUTH_SIGNUP_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(FORGOT_PASSWORD_LINK))
    .step(fill(RESET_EMAIL, "john.doe@example.com"))
    .step(click(RESET_SUBMIT))
    .step(click(BACK_TO_LOGIN))
    .step(fill(AUTH_EMAIL, ""))
    .step(fill(AUTH_PASSWORD, ""))
    .step(fill(AUTH_EMAIL, "john.doe@example.com"))
    .step(fill(AUTH_PASSWORD, "NewTestPassword123"))
    .step(click(AUTH_SUBMIT))
    .assert(see("Address book updated successfully").with_timeout(CONFIRM_TIMEOUT))
}

/// Sign in via the reset flow and land back on the storefront home.
pub fn order_history() -> Scenario {
    Scenario::new(
        "order_history",
        "Order history display behind the auth flow",
    )
    .step(click(SIGN_IN_LINK))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(FORGOT_PASSWORD_LINK))
    .step(fill(RESET_EMAIL, "testuser@example.com"))
    .step(click(RESET_SUBMIT))
    .step(click(BACK_TO_LOGIN))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "NewPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(SIGN_UP_LINK))
    .step(fill(AUTH_EMAIL, "Test User"))
    .step(fill(AUTH_PASSWORD, "newuser@example.com"))
    .step(fill(AUTH_SIGNUP_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click("html/body/div/div/header/div/a/div/img"))
    .assert(see("Order Confirmation Success").with_timeout(CONFIRM_TIMEOUT))
}

/// Sign up, browse to a product, add it to the cart, check out and place
/// the order.
pub fn order_tracking() -> Scenario {
    Scenario::new(
        "order_tracking",
        "Order tracking from sign-up through checkout",
    )
    .step(click(SIGN_IN_LINK))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "TestPassword123"))
    .step(click(AUTH_SUBMIT))
    .step(click(SIGN_UP_LINK))
    .step(fill(AUTH_EMAIL, "John Doe"))
    .step(fill(AUTH_PASSWORD, "johndoe@example.com"))
    .step(fill(AUTH_SIGNUP_PASSWORD, "SecurePass123"))
    .step(click(AUTH_SUBMIT))
    .step(click(ACCOUNT_MENU))
    .step(click("html/body/div[2]/div/a[2]"))
    .step(click("html/body/div/div/main/div/div/div/a/button"))
    .step(click("html/body/div/div/main/div/div/div/div[2]/a"))
    .step(click("html/body/div/div/main/div/div/div[4]/div/div/button"))
    .step(click("html/body/div/div/main/div/div/div[4]/div/div/a"))
    .step(fill(CHECKOUT_STREET, "123 Main Street"))
    .step(fill(CHECKOUT_CITY, "Mumbai"))
    .step(fill(CHECKOUT_STATE, "Maharashtra"))
    .step(fill("html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[2]/div[3]/input", "400001"))
    .step(fill("html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[3]/input", "9876543210"))
    .step(click(CHECKOUT_SUBMIT))
    .step(click(CHECKOUT_SUBMIT))
    .assert(see("Order Delivered Successfully! Congratulations").with_timeout(CONFIRM_TIMEOUT))
}

/// Password changes through the reset flow, with explicit clears of the
/// password field between attempts.
pub fn security_settings() -> Scenario {
    Scenario::new(
        "security_settings",
        "Security settings update and validation",
    )
    .step(click(SIGN_IN_LINK))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "OldPassword123!"))
    .step(click(AUTH_SUBMIT))
    .step(fill(AUTH_EMAIL, ""))
    .step(fill(AUTH_PASSWORD, ""))
    .step(fill(AUTH_EMAIL, "testuser@example.com"))
    .step(fill(AUTH_PASSWORD, "CorrectPassword123!"))
    .step(click(AUTH_SUBMIT))
    .step(click(FORGOT_PASSWORD_LINK))
    .step(fill(RESET_EMAIL, "testuser@example.com"))
    .step(click(RESET_SUBMIT))
    .step(click(BACK_TO_LOGIN))
    .step(fill(AUTH_PASSWORD, "NewPassword123!"))
    .step(click(AUTH_SUBMIT))
    .step(fill(AUTH_PASSWORD, ""))
    .step(fill(AUTH_PASSWORD, "NewPassword123!"))
    .step(fill(AUTH_PASSWORD, ""))
    .step(fill(AUTH_PASSWORD, "NewPassword123!"))
    .assert(see("Two-Factor Authentication Enabled Successfully").with_timeout(CONFIRM_TIMEOUT))
}

/// Walk to the checkout page via the shop and verify its content inventory.
pub fn checkout_page_content() -> Scenario {
    Scenario::new(
        "checkout_page_content",
        "Checkout page renders its full content inventory",
    )
    .step(click("html/body/div/div/header/div/nav/a"))
    .step(click("html/body/div/div/main/div/div/div/div[2]/a"))
    .step(click("html/body/div/div/main/div/div/div[4]/div/div/button"))
    .step(click("html/body/div/div/main/div/div/div[4]/div/div/a"))
    .step(fill(CHECKOUT_NAME, "Test User"))
    .step(fill(CHECKOUT_EMAIL, "testuser@example.com"))
    .step(fill(CHECKOUT_STREET, "123 Test Street"))
    .step(fill(CHECKOUT_CITY, "Test City"))
    .step(fill(CHECKOUT_STATE, "Test State"))
    // This page revision lays the zip and phone fields out differently from
    // the cart-entry checkout.
    .step(fill("html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[2]/div[3]/input", "123456"))
    .step(fill("html/body/div/div/main/div/div/div[2]/div/form/div[3]/div/div[3]/input", "9876543210"))
    .step(click(CHECKOUT_SUBMIT))
    .assert(see("Complete Your Purchase"))
    .assert(see("Sign in for faster checkout and to save your information for next time."))
    .assert(see("Continue as Guest"))
    .assert(see("Information"))
    .assert(see("Review"))
    .assert(see("Payment"))
    .assert(see("Full Name"))
    .assert(see("Street Address"))
    .assert(see("ZIP Code"))
    .assert(see("Phone Number"))
    .assert(see("Redwine soap × 1"))
    .assert(see("₹100.00"))
    .assert(see("Subtotal"))
    .assert(see("Shipping"))
    .assert(see("₹60.00"))
    .assert(see("Estimated Delivery"))
    .assert(see("3-4 days"))
    .assert(see("Total"))
    .assert(see("₹160.00"))
    .assert(see("Pay with Razorpay"))
    .assert(see("Secure payment via Razorpay"))
    .assert(see("Secure checkout powered by Razorpay"))
    .assert(see("Privacy Policy"))
    .assert(see("Terms & Conditions"))
    .assert(see("Shipping Policy"))
    .assert(see("Cancellations & Refunds"))
    .assert(see("© 2025 Karigai. All rights reserved."))
}

/// The full journey suite, in the order it ships.
pub fn all() -> Vec<Scenario> {
    vec![
        cart_management(),
        checkout_payment(),
        checkout_invalid_phone(),
        profile_update(),
        address_book(),
        order_history(),
        order_tracking(),
        security_settings(),
        checkout_page_content(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_suite_names_are_unique() {
        let suite = all();
        let names: HashSet<&str> = suite.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names.len(), suite.len());
    }

    #[test]
    fn test_every_journey_has_steps_and_assertions() {
        for scenario in all() {
            assert!(!scenario.steps.is_empty(), "{} has no steps", scenario.name);
            assert!(
                !scenario.assertions.is_empty(),
                "{} has no assertions",
                scenario.name
            );
        }
    }

    #[test]
    fn test_no_journey_starts_with_a_navigate() {
        // The runner owns the initial navigation.
        for scenario in all() {
            assert!(
                !matches!(scenario.steps[0], ScenarioStep::Navigate { .. }),
                "{} duplicates the runner's initial navigation",
                scenario.name
            );
        }
    }

    #[test]
    fn test_security_settings_exercises_explicit_clears() {
        let scenario = security_settings();
        let clears = scenario
            .steps
            .iter()
            .filter(|s| matches!(s, ScenarioStep::Fill { value, .. } if value.is_empty()))
            .count();
        assert!(clears >= 2);
    }

    #[test]
    fn test_invalid_phone_journey_expects_no_confirmation() {
        let scenario = checkout_invalid_phone();
        assert!(scenario.assertions.iter().any(|a| !a.visible));
    }
}
