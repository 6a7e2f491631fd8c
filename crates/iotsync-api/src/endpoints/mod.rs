// Endpoint groups, implemented as inherent methods on `ApiClient`.

mod devices;
mod notifications;
mod onboarding;
